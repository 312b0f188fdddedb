//! Record types for Riffle.
//!
//! A `Record` is one delivered unit of a shard, translated from whatever the
//! delivery framework hands over. Besides its payload it carries a
//! `Completion`: a single-fire signal that the downstream consumer sets once
//! it has finished with the record. Checkpointing is driven entirely by these
//! signals.
//!
//! # Completion Semantics
//!
//! - Fires at most once; later calls to `complete` are no-ops.
//! - Observable without blocking (`is_complete`) and asynchronously (`wait`).
//! - Clones of a record share the same signal, so the copy handed downstream
//!   and the copy kept for checkpoint tracking always agree.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::watch;

use crate::types::{Position, SequenceNumber};

// -----------------------------------------------------------------------------
// Timestamp
// -----------------------------------------------------------------------------

/// Timestamp type for records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Timestamps won't overflow i64 for centuries.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }
}

// -----------------------------------------------------------------------------
// Completion
// -----------------------------------------------------------------------------

/// Single-fire, write-once completion signal.
#[derive(Clone)]
pub struct Completion {
    done: Arc<watch::Sender<bool>>,
}

impl Completion {
    /// Creates a signal that has not fired yet.
    #[must_use]
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            done: Arc::new(done),
        }
    }

    /// Fires the signal.
    ///
    /// Returns true only for the call that actually fired it.
    pub fn complete(&self) -> bool {
        self.done.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    /// Returns true if the signal has fired.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    /// Waits until the signal fires.
    pub async fn wait(&self) {
        self.wait_owned().await;
    }

    /// Returns an owned future that resolves once the signal fires.
    ///
    /// The future keeps the signal alive, so it can be raced or moved into
    /// another task independently of the record it came from.
    pub fn wait_owned(&self) -> impl Future<Output = ()> + Send + 'static {
        let done = Arc::clone(&self.done);
        async move {
            let mut rx = done.subscribe();
            loop {
                let fired = *rx.borrow_and_update();
                if fired {
                    return;
                }
                // `done` owns the sender, so the channel stays open here.
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Record
// -----------------------------------------------------------------------------

/// A record delivered from a shard, awaiting downstream processing.
#[derive(Clone)]
pub struct Record {
    position: Position,
    partition_key: String,
    data: Bytes,
    approximate_arrival: Option<Timestamp>,
    completion: Completion,
}

impl Record {
    /// Creates a new record with an unfired completion signal.
    #[must_use]
    pub fn new(position: Position, partition_key: impl Into<String>, data: Bytes) -> Self {
        Self {
            position,
            partition_key: partition_key.into(),
            data,
            approximate_arrival: None,
            completion: Completion::new(),
        }
    }

    /// Sets the approximate arrival timestamp reported by the stream.
    #[must_use]
    pub fn with_arrival(mut self, arrival: Timestamp) -> Self {
        self.approximate_arrival = Some(arrival);
        self
    }

    /// Returns the position of this record within its shard.
    #[must_use]
    pub const fn position(&self) -> &Position {
        &self.position
    }

    /// Returns the primary sequence number.
    #[must_use]
    pub const fn sequence_number(&self) -> &SequenceNumber {
        &self.position.sequence_number
    }

    /// Returns the sub-sequence number for de-aggregated records.
    #[must_use]
    pub const fn sub_sequence_number(&self) -> Option<u64> {
        self.position.sub_sequence_number
    }

    /// Returns a human-readable offset descriptor, `seq` or `seq/sub`.
    #[must_use]
    pub fn offset_string(&self) -> String {
        self.position.to_string()
    }

    /// Returns the partition key the producer used.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Returns the record payload.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the approximate arrival timestamp, if the stream reported one.
    #[must_use]
    pub const fn approximate_arrival(&self) -> Option<Timestamp> {
        self.approximate_arrival
    }

    /// Marks the record as fully processed downstream.
    ///
    /// Returns true if this call fired the completion signal.
    pub fn mark_processed(&self) -> bool {
        self.completion.complete()
    }

    /// Returns true once the record has been marked processed.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.completion.is_complete()
    }

    /// Returns the completion signal shared by all clones of this record.
    #[must_use]
    pub const fn completion(&self) -> &Completion {
        &self.completion
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("position", &self.position)
            .field("partition_key", &self.partition_key)
            .field("data_len", &self.data.len())
            .field("processed", &self.is_processed())
            .finish()
    }
}
