//! In-flight record tracking and checkpoint decisions.
//!
//! The tracker is owned by a single shard's bridge and is only ever touched
//! from that shard's callback task, so its state is plain fields. The only
//! state shared with other tasks is each record's completion signal.

use std::collections::VecDeque;
use std::future::Future;

use riffle_core::{Position, Record};
use tokio::time::Instant;
use tracing::debug;

use crate::checkpointer::Checkpointer;
use crate::config::CheckpointConfig;
use crate::error::CheckpointResult;

// -----------------------------------------------------------------------------
// Checkpoint Tracker
// -----------------------------------------------------------------------------

/// Tracks in-flight records of one shard and decides when to checkpoint.
///
/// # Invariants
///
/// - Records are evicted from the front only, and only once they and every
///   record delivered before them have completed.
/// - The pending checkpoint is always the last evicted record, so it never
///   lies beyond an incomplete record.
#[derive(Debug)]
pub struct CheckpointTracker {
    /// Thresholds.
    config: CheckpointConfig,
    /// Delivered records awaiting completion, in delivery order.
    in_flight: VecDeque<Record>,
    /// Last evicted record that has not been persisted yet.
    pending: Option<Record>,
    /// Position of the most recently watched record.
    last_watched: Option<Position>,
    /// Records evicted since the last checkpoint attempt.
    completed_since_checkpoint: u64,
    /// When the last checkpoint attempt was made.
    last_checkpoint_at: Instant,
}

impl CheckpointTracker {
    /// Creates a tracker with nothing in flight.
    ///
    /// The checkpoint timer starts now.
    #[must_use]
    pub fn new(config: CheckpointConfig) -> Self {
        Self {
            config,
            in_flight: VecDeque::new(),
            pending: None,
            last_watched: None,
            completed_since_checkpoint: 0,
            last_checkpoint_at: Instant::now(),
        }
    }

    /// Returns the thresholds this tracker was created with.
    #[must_use]
    pub const fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Appends freshly delivered records to the tail of the in-flight sequence.
    ///
    /// # Panics
    ///
    /// Panics if a record does not lie strictly after every record watched
    /// before it, including records already evicted or persisted.
    pub fn watch_for_completion(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            // TigerStyle: Assert precondition.
            if let Some(last) = &self.last_watched {
                assert!(
                    record.position() > last,
                    "record {} delivered out of order after {}",
                    record.position(),
                    last
                );
            }
            self.last_watched = Some(record.position().clone());
            self.in_flight.push_back(record);
        }
    }

    /// Returns true if a checkpoint is due.
    ///
    /// Advances the cursor first: the completed prefix of the in-flight
    /// sequence is evicted even when no checkpoint is due.
    pub fn should_checkpoint(&mut self) -> bool {
        self.advance();
        self.completed_since_checkpoint >= u64::from(self.config.max_batch_size)
            || self.last_checkpoint_at.elapsed() >= self.config.max_batch_wait
    }

    /// Persists the most recently completed record, if any.
    ///
    /// Returns the persisted position, or `None` if nothing completed since
    /// the last successful checkpoint. Whatever the outcome, the count and
    /// the timer are reset, so a failed attempt is retried only after a full
    /// threshold period. The pending record itself survives a failure and is
    /// persisted by the next attempt (or replaced by a later record).
    ///
    /// # Errors
    ///
    /// Returns the checkpointer's error unchanged; classifying it is up to
    /// the caller.
    pub async fn checkpoint_last_completed_record(
        &mut self,
        checkpointer: &dyn Checkpointer,
    ) -> CheckpointResult<Option<Position>> {
        self.advance();

        let result = match &self.pending {
            Some(record) => {
                let position = record.position().clone();
                match checkpointer.checkpoint(&position).await {
                    Ok(()) => {
                        self.pending = None;
                        Ok(Some(position))
                    }
                    Err(e) => Err(e),
                }
            }
            None => Ok(None),
        };

        self.completed_since_checkpoint = 0;
        self.last_checkpoint_at = Instant::now();

        result
    }

    /// Returns true if every tracked record has completed.
    #[must_use]
    pub fn all_in_flight_records_completed(&self) -> bool {
        self.in_flight.iter().all(Record::is_processed)
    }

    /// Returns a future that resolves once every currently tracked record
    /// has completed.
    ///
    /// The future owns its observations, so it does not borrow the tracker
    /// and can be raced or bounded by the caller. Records delivered after
    /// this call are not covered.
    pub fn all_in_flight_records_completed_awaitable(
        &self,
    ) -> impl Future<Output = ()> + Send + 'static {
        let waits: Vec<_> = self
            .in_flight
            .iter()
            .filter(|record| !record.is_processed())
            .map(|record| record.completion().wait_owned())
            .collect();

        async move {
            futures::future::join_all(waits).await;
        }
    }

    /// Returns the number of records still in flight.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns the position a checkpoint would persist right now.
    #[must_use]
    pub fn pending_position(&self) -> Option<&Position> {
        self.pending.as_ref().map(Record::position)
    }

    /// Returns the number of records evicted since the last checkpoint attempt.
    #[must_use]
    pub const fn completed_since_checkpoint(&self) -> u64 {
        self.completed_since_checkpoint
    }

    /// Evicts the maximal completed prefix of the in-flight sequence.
    fn advance(&mut self) {
        let mut evicted = 0u64;

        while let Some(front) = self.in_flight.front() {
            if !front.is_processed() {
                break;
            }
            // Checked above.
            if let Some(record) = self.in_flight.pop_front() {
                self.pending = Some(record);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.completed_since_checkpoint += evicted;
            debug!(
                evicted,
                in_flight = self.in_flight.len(),
                pending = ?self.pending_position().map(ToString::to_string),
                "Advanced checkpoint cursor"
            );
        }

        // TigerStyle: Assert postcondition.
        assert!(
            self.in_flight.front().map_or(true, |front| !front.is_processed()),
            "completed record left at the front of the in-flight sequence"
        );
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
