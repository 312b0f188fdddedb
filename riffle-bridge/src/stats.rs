//! Stats reporting.
//!
//! The bridge reports every lifecycle and checkpoint event to a
//! `StatsReporter`. Three reporters are provided: `NoopStats` discards
//! everything, `TracingStats` turns events into structured `tracing` events,
//! and `CountingStats` keeps atomic counters for tests and summaries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use riffle_checkpoint::CheckpointError;
use riffle_core::{PartitionIdentity, Position, Record};
use riffle_flow::OfferResult;
use tracing::{debug, info, trace, warn};

use crate::processor::ShutdownReason;

/// Receives bridge events for reporting.
pub trait StatsReporter: Send + Sync {
    /// A shard was initialized.
    fn track_initialization(&self, identity: &PartitionIdentity, starting: Option<&Position>);

    /// A record was delivered and translated.
    fn track_record(&self, identity: &PartitionIdentity, record: &Record);

    /// A batch offer finished after `elapsed`.
    fn track_batch_enqueue(
        &self,
        identity: &PartitionIdentity,
        batch_size: usize,
        elapsed: Duration,
        result: &OfferResult,
    );

    /// A positional checkpoint was persisted.
    fn checkpoint_acked(&self, identity: &PartitionIdentity, position: &Position);

    /// A checkpoint failed transiently and will be retried.
    fn checkpoint_delayed(&self, identity: &PartitionIdentity, error: &CheckpointError);

    /// A checkpoint failed fatally.
    fn checkpoint_failed(&self, identity: &PartitionIdentity, error: &CheckpointError);

    /// The end-of-shard marker was persisted.
    fn checkpoint_shard_end_acked(&self, identity: &PartitionIdentity);

    /// A shard finished shutting down.
    fn track_shutdown(&self, identity: &PartitionIdentity, reason: ShutdownReason);
}

// -----------------------------------------------------------------------------
// NoopStats
// -----------------------------------------------------------------------------

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl StatsReporter for NoopStats {
    fn track_initialization(&self, _: &PartitionIdentity, _: Option<&Position>) {}
    fn track_record(&self, _: &PartitionIdentity, _: &Record) {}
    fn track_batch_enqueue(&self, _: &PartitionIdentity, _: usize, _: Duration, _: &OfferResult) {}
    fn checkpoint_acked(&self, _: &PartitionIdentity, _: &Position) {}
    fn checkpoint_delayed(&self, _: &PartitionIdentity, _: &CheckpointError) {}
    fn checkpoint_failed(&self, _: &PartitionIdentity, _: &CheckpointError) {}
    fn checkpoint_shard_end_acked(&self, _: &PartitionIdentity) {}
    fn track_shutdown(&self, _: &PartitionIdentity, _: ShutdownReason) {}
}

// -----------------------------------------------------------------------------
// TracingStats
// -----------------------------------------------------------------------------

/// Emits each event as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStats;

impl StatsReporter for TracingStats {
    fn track_initialization(&self, identity: &PartitionIdentity, starting: Option<&Position>) {
        info!(
            shard = %identity,
            starting_position = ?starting.map(ToString::to_string),
            "stats: initialized"
        );
    }

    fn track_record(&self, identity: &PartitionIdentity, record: &Record) {
        trace!(
            shard = %identity,
            offset = %record.offset_string(),
            bytes = record.data().len(),
            "stats: record"
        );
    }

    fn track_batch_enqueue(
        &self,
        identity: &PartitionIdentity,
        batch_size: usize,
        elapsed: Duration,
        result: &OfferResult,
    ) {
        debug!(
            shard = %identity,
            batch_size,
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            result = result.name(),
            "stats: batch enqueue"
        );
    }

    fn checkpoint_acked(&self, identity: &PartitionIdentity, position: &Position) {
        debug!(shard = %identity, position = %position, "stats: checkpoint acked");
    }

    fn checkpoint_delayed(&self, identity: &PartitionIdentity, error: &CheckpointError) {
        warn!(shard = %identity, kind = error.kind(), error = %error, "stats: checkpoint delayed");
    }

    fn checkpoint_failed(&self, identity: &PartitionIdentity, error: &CheckpointError) {
        warn!(shard = %identity, kind = error.kind(), error = %error, "stats: checkpoint failed");
    }

    fn checkpoint_shard_end_acked(&self, identity: &PartitionIdentity) {
        info!(shard = %identity, "stats: shard end acked");
    }

    fn track_shutdown(&self, identity: &PartitionIdentity, reason: ShutdownReason) {
        info!(shard = %identity, reason = %reason, "stats: shutdown");
    }
}

// -----------------------------------------------------------------------------
// CountingStats
// -----------------------------------------------------------------------------

/// Point-in-time copy of `CountingStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Shards initialized.
    pub initializations: u64,
    /// Records delivered.
    pub records: u64,
    /// Batches accepted by the queue.
    pub batches_enqueued: u64,
    /// Batches not accepted (closed, dropped or failed).
    pub batches_rejected: u64,
    /// Total time spent offering batches, in microseconds.
    pub enqueue_time_us: u64,
    /// Positional checkpoints persisted.
    pub checkpoints_acked: u64,
    /// Transient checkpoint failures.
    pub checkpoints_delayed: u64,
    /// Fatal checkpoint failures.
    pub checkpoints_failed: u64,
    /// End-of-shard markers persisted.
    pub shard_ends_acked: u64,
    /// Shutdowns after losing the lease.
    pub shutdowns_zombie: u64,
    /// Shutdowns at shard end.
    pub shutdowns_terminate: u64,
    /// Requested shutdowns.
    pub shutdowns_requested: u64,
}

impl StatsSnapshot {
    /// Returns the total number of shutdowns.
    #[must_use]
    pub const fn shutdowns(&self) -> u64 {
        self.shutdowns_zombie + self.shutdowns_terminate + self.shutdowns_requested
    }
}

/// Counts every event with atomic counters.
#[derive(Debug, Default)]
pub struct CountingStats {
    initializations: AtomicU64,
    records: AtomicU64,
    batches_enqueued: AtomicU64,
    batches_rejected: AtomicU64,
    enqueue_time_us: AtomicU64,
    checkpoints_acked: AtomicU64,
    checkpoints_delayed: AtomicU64,
    checkpoints_failed: AtomicU64,
    shard_ends_acked: AtomicU64,
    shutdowns_zombie: AtomicU64,
    shutdowns_terminate: AtomicU64,
    shutdowns_requested: AtomicU64,
}

impl CountingStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            initializations: self.initializations.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            enqueue_time_us: self.enqueue_time_us.load(Ordering::Relaxed),
            checkpoints_acked: self.checkpoints_acked.load(Ordering::Relaxed),
            checkpoints_delayed: self.checkpoints_delayed.load(Ordering::Relaxed),
            checkpoints_failed: self.checkpoints_failed.load(Ordering::Relaxed),
            shard_ends_acked: self.shard_ends_acked.load(Ordering::Relaxed),
            shutdowns_zombie: self.shutdowns_zombie.load(Ordering::Relaxed),
            shutdowns_terminate: self.shutdowns_terminate.load(Ordering::Relaxed),
            shutdowns_requested: self.shutdowns_requested.load(Ordering::Relaxed),
        }
    }
}

impl StatsReporter for CountingStats {
    fn track_initialization(&self, _: &PartitionIdentity, _: Option<&Position>) {
        self.initializations.fetch_add(1, Ordering::Relaxed);
    }

    fn track_record(&self, _: &PartitionIdentity, _: &Record) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    fn track_batch_enqueue(
        &self,
        _: &PartitionIdentity,
        _: usize,
        elapsed: Duration,
        result: &OfferResult,
    ) {
        let counter = match result {
            OfferResult::Enqueued => &self.batches_enqueued,
            OfferResult::QueueClosed | OfferResult::Dropped | OfferResult::Failed(_) => {
                &self.batches_rejected
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.enqueue_time_us.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    fn checkpoint_acked(&self, _: &PartitionIdentity, _: &Position) {
        self.checkpoints_acked.fetch_add(1, Ordering::Relaxed);
    }

    fn checkpoint_delayed(&self, _: &PartitionIdentity, _: &CheckpointError) {
        self.checkpoints_delayed.fetch_add(1, Ordering::Relaxed);
    }

    fn checkpoint_failed(&self, _: &PartitionIdentity, _: &CheckpointError) {
        self.checkpoints_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn checkpoint_shard_end_acked(&self, _: &PartitionIdentity) {
        self.shard_ends_acked.fetch_add(1, Ordering::Relaxed);
    }

    fn track_shutdown(&self, _: &PartitionIdentity, reason: ShutdownReason) {
        let counter = match reason {
            ShutdownReason::Zombie => &self.shutdowns_zombie,
            ShutdownReason::Terminate => &self.shutdowns_terminate,
            ShutdownReason::Requested => &self.shutdowns_requested,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
