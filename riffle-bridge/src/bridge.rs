//! The consumption bridge.
//!
//! One `ConsumptionBridge` serves one shard for the lifetime of its lease.
//! The delivery framework drives it strictly sequentially, so all tracking
//! state lives in plain fields; only record completions and the pipeline
//! kill switch are shared with other tasks.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use riffle_checkpoint::{
    CheckpointError, CheckpointTracker, Checkpointer, FailureDisposition,
};
use riffle_core::{Error, Limits, PartitionIdentity, Position, Record, SequenceNumber};
use riffle_flow::{KillSwitch, OfferResult, RecordQueue};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::processor::{
    DeliveredRecord, InitializationInput, ProcessRecordsInput, RecordProcessor, ShutdownInput,
    ShutdownReason,
};
use crate::stats::StatsReporter;

/// Lifecycle state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Waiting for `initialize`.
    Initializing,
    /// Accepting batches.
    Processing,
    /// Shut down; every further callback is ignored.
    Terminated,
}

// -----------------------------------------------------------------------------
// ConsumptionBridge
// -----------------------------------------------------------------------------

/// Per-shard implementation of the delivery framework's callback contract.
pub struct ConsumptionBridge {
    config: BridgeConfig,
    limits: Limits,
    queue: Box<dyn RecordQueue>,
    kill_switch: KillSwitch,
    stats: Arc<dyn StatsReporter>,
    tracker: CheckpointTracker,
    state: BridgeState,
    /// Set once an offer reported `QueueClosed`.
    queue_closed: bool,
    /// Set by `initialize`.
    identity: Option<PartitionIdentity>,
}

impl ConsumptionBridge {
    /// Creates a bridge feeding `queue`.
    #[must_use]
    pub fn new(
        config: BridgeConfig,
        queue: Box<dyn RecordQueue>,
        kill_switch: KillSwitch,
        stats: Arc<dyn StatsReporter>,
    ) -> Self {
        let tracker = CheckpointTracker::new(config.checkpoint);
        Self {
            config,
            limits: Limits::default(),
            queue,
            kill_switch,
            stats,
            tracker,
            state: BridgeState::Initializing,
            queue_closed: false,
            identity: None,
        }
    }

    /// Builder: set the limits delivered batches are checked against.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> BridgeState {
        self.state
    }

    /// Returns the partition identity, once initialized.
    #[must_use]
    pub const fn identity(&self) -> Option<&PartitionIdentity> {
        self.identity.as_ref()
    }

    /// Returns the checkpoint tracker.
    #[must_use]
    pub const fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    async fn process_batch(
        &mut self,
        identity: &PartitionIdentity,
        input: ProcessRecordsInput,
    ) -> BridgeResult<()> {
        let ProcessRecordsInput {
            records,
            millis_behind_latest,
            checkpointer,
        } = input;
        debug!(
            shard = %identity,
            records = records.len(),
            millis_behind_latest,
            "Processing batch"
        );

        let actual = u64::try_from(records.len()).unwrap_or(u64::MAX);
        let max = u64::from(self.limits.max_records_per_batch);
        if actual > max {
            return Err(BridgeError::BatchRejected(Error::LimitExceeded {
                limit: "records_per_batch",
                max,
                actual,
            }));
        }

        let batch = records
            .into_iter()
            .map(translate)
            .collect::<BridgeResult<Vec<_>>>()?;
        for record in &batch {
            self.stats.track_record(identity, record);
        }

        // Register before enqueue: completions can only fire after the
        // consumer sees the batch.
        self.tracker.watch_for_completion(batch.iter().cloned());

        let batch_size = batch.len();
        let started = Instant::now();
        let result = self.queue.offer(batch).await;
        self.stats
            .track_batch_enqueue(identity, batch_size, started.elapsed(), &result);

        match result {
            OfferResult::Enqueued => {}
            OfferResult::QueueClosed => {
                // The batch stays tracked but can never complete.
                debug!(shard = %identity, batch_size, "Queue closed, batch not enqueued");
                self.queue_closed = true;
            }
            OfferResult::Dropped => {
                return Err(BridgeError::QueueDropped {
                    records: batch_size,
                });
            }
            OfferResult::Failed(cause) => return Err(BridgeError::QueueFailed { cause }),
        }

        if self.tracker.should_checkpoint() {
            self.checkpoint(identity, checkpointer.as_ref()).await?;
        }
        Ok(())
    }

    async fn drain(
        &mut self,
        identity: &PartitionIdentity,
        reason: ShutdownReason,
        checkpointer: &dyn Checkpointer,
    ) -> BridgeResult<()> {
        match reason {
            ShutdownReason::Zombie => {
                debug!(shard = %identity, "Lease lost, skipping drain and checkpoint");
                Ok(())
            }
            ShutdownReason::Terminate => self.drain_to_shard_end(identity, checkpointer).await,
            ShutdownReason::Requested => self.drain_with_deadline(identity, checkpointer).await,
        }
    }

    /// Waits for in-flight records, pipeline termination or queue closure,
    /// whichever comes first, then checkpoints the shard end if everything
    /// completed.
    async fn drain_to_shard_end(
        &mut self,
        identity: &PartitionIdentity,
        checkpointer: &dyn Checkpointer,
    ) -> BridgeResult<()> {
        if self.queue_closed {
            warn!(
                shard = %identity,
                in_flight = self.tracker.in_flight_len(),
                "Queue closed earlier, not waiting for in-flight records"
            );
        } else {
            let all_completed = self.tracker.all_in_flight_records_completed_awaitable();
            let termination = self.kill_switch.termination();

            tokio::select! {
                biased;
                () = all_completed => {
                    debug!(shard = %identity, "All in-flight records completed");
                }
                status = termination.terminated() => {
                    warn!(
                        shard = %identity,
                        status = %status,
                        in_flight = self.tracker.in_flight_len(),
                        "Pipeline terminated while draining"
                    );
                }
                () = self.queue.closed() => {
                    warn!(
                        shard = %identity,
                        in_flight = self.tracker.in_flight_len(),
                        "Queue closed while draining"
                    );
                }
            }
        }

        if self.tracker.all_in_flight_records_completed() {
            match checkpointer.checkpoint_shard_end().await {
                Ok(()) => {
                    info!(shard = %identity, "Checkpointed shard end");
                    self.stats.checkpoint_shard_end_acked(identity);
                    Ok(())
                }
                Err(e) => self.classify(identity, e),
            }
        } else {
            self.checkpoint(identity, checkpointer).await
        }
    }

    /// Waits up to `shutdown_wait` for in-flight records, unless the pipeline
    /// already failed, then checkpoints whatever completed.
    async fn drain_with_deadline(
        &mut self,
        identity: &PartitionIdentity,
        checkpointer: &dyn Checkpointer,
    ) -> BridgeResult<()> {
        if self.kill_switch.termination().has_failed() {
            info!(shard = %identity, "Pipeline already failed, not waiting for in-flight records");
        } else {
            let wait = self.config.checkpoint.shutdown_wait;
            let all_completed = self.tracker.all_in_flight_records_completed_awaitable();
            if tokio::time::timeout(wait, all_completed).await.is_err() {
                warn!(
                    shard = %identity,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    in_flight = self.tracker.in_flight_len(),
                    "Timed out waiting for in-flight records"
                );
            }
        }
        self.checkpoint(identity, checkpointer).await
    }

    async fn checkpoint(
        &mut self,
        identity: &PartitionIdentity,
        checkpointer: &dyn Checkpointer,
    ) -> BridgeResult<()> {
        match self
            .tracker
            .checkpoint_last_completed_record(checkpointer)
            .await
        {
            Ok(Some(position)) => {
                debug!(shard = %identity, position = %position, "Checkpointed");
                self.stats.checkpoint_acked(identity, &position);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => self.classify(identity, e),
        }
    }

    fn classify(&self, identity: &PartitionIdentity, e: CheckpointError) -> BridgeResult<()> {
        match e.disposition() {
            FailureDisposition::Moot => {
                debug!(shard = %identity, error = %e, "Checkpoint moot, shard already released");
                Ok(())
            }
            FailureDisposition::Transient => {
                warn!(shard = %identity, error = %e, "Checkpoint delayed, retrying later");
                self.stats.checkpoint_delayed(identity, &e);
                Ok(())
            }
            FailureDisposition::Fatal => {
                self.stats.checkpoint_failed(identity, &e);
                Err(BridgeError::Checkpoint(e))
            }
        }
    }

    /// Converts a failed or panicked callback into a pipeline abort.
    fn contain(
        &self,
        identity: &PartitionIdentity,
        callback: &'static str,
        outcome: Result<BridgeResult<()>, Box<dyn Any + Send>>,
    ) {
        let e = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => BridgeError::Panic {
                message: panic_message(payload.as_ref()),
            },
        };
        error!(shard = %identity, callback, error = %e, "Aborting pipeline");
        self.kill_switch.abort(format!("{identity}: {e}"));
    }
}

#[async_trait]
impl RecordProcessor for ConsumptionBridge {
    async fn initialize(&mut self, input: InitializationInput) {
        if self.state != BridgeState::Initializing {
            warn!(shard = %input.shard_id, state = ?self.state, "Ignoring repeated initialize");
            return;
        }

        let identity = PartitionIdentity::new(self.config.application_name.clone(), input.shard_id);
        info!(
            shard = %identity,
            starting_position = ?input.starting_position.as_ref().map(ToString::to_string),
            "Initialized"
        );
        self.stats
            .track_initialization(&identity, input.starting_position.as_ref());
        self.identity = Some(identity);
        self.state = BridgeState::Processing;
    }

    async fn process_records(&mut self, input: ProcessRecordsInput) {
        let identity = match (&self.state, &self.identity) {
            (BridgeState::Processing, Some(identity)) => identity.clone(),
            _ => {
                warn!(
                    state = ?self.state,
                    records = input.records.len(),
                    "Ignoring batch outside processing"
                );
                return;
            }
        };

        let outcome = AssertUnwindSafe(self.process_batch(&identity, input))
            .catch_unwind()
            .await;
        self.contain(&identity, "process_records", outcome);
    }

    async fn shutdown(&mut self, input: ShutdownInput) {
        let ShutdownInput {
            reason,
            checkpointer,
        } = input;

        match self.state {
            BridgeState::Processing => {}
            BridgeState::Initializing => {
                warn!(reason = %reason, "Shutdown before initialize");
                self.state = BridgeState::Terminated;
                self.queue.complete();
                return;
            }
            BridgeState::Terminated => {
                warn!(reason = %reason, "Ignoring repeated shutdown");
                return;
            }
        }
        self.state = BridgeState::Terminated;

        let Some(identity) = self.identity.clone() else {
            self.queue.complete();
            return;
        };
        info!(
            shard = %identity,
            reason = %reason,
            in_flight = self.tracker.in_flight_len(),
            "Shutting down"
        );

        let outcome = AssertUnwindSafe(self.drain(&identity, reason, checkpointer.as_ref()))
            .catch_unwind()
            .await;
        self.contain(&identity, "shutdown", outcome);

        self.queue.complete();
        self.stats.track_shutdown(&identity, reason);
        info!(shard = %identity, reason = %reason, "Shut down");
    }
}

fn translate(delivered: DeliveredRecord) -> BridgeResult<Record> {
    let sequence_number: SequenceNumber = delivered.sequence_number.parse()?;
    let position = match delivered.sub_sequence_number {
        Some(sub) => Position::with_sub_sequence(sequence_number, sub),
        None => Position::new(sequence_number),
    };

    let record = Record::new(position, delivered.partition_key, delivered.data);
    Ok(match delivered.approximate_arrival {
        Some(arrival) => record.with_arrival(arrival),
        None => record,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
