//! Bounded record queue.
//!
//! Batches of records flow from the per-shard bridges into a single bounded
//! channel drained by the downstream consumer. Each shard gets its own
//! producer handle; the consumer side ends once every handle has completed.
//!
//! When the channel is full the overflow strategy decides what an offer does:
//! wait for capacity (backpressure), drop the batch, or fail. A waiting offer
//! also watches the pipeline termination, so an aborted pipeline never leaves
//! a producer blocked.

use std::fmt;
use std::future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use riffle_core::{Error, Limits, Record, Result};
use tokio::sync::mpsc;
use tracing::debug;

use crate::kill_switch::{PipelineStatus, Termination};

// -----------------------------------------------------------------------------
// Offer Results
// -----------------------------------------------------------------------------

/// Outcome of offering a batch to a record queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferResult {
    /// The batch was accepted.
    Enqueued,
    /// The queue no longer accepts batches.
    QueueClosed,
    /// The batch was discarded because the queue was full.
    Dropped,
    /// The offer failed.
    Failed(String),
}

impl OfferResult {
    /// Returns a short, stable name for stats and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::QueueClosed => "queue_closed",
            Self::Dropped => "dropped",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for OfferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(cause) => write!(f, "failed: {cause}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Producer side of a record queue.
#[async_trait]
pub trait RecordQueue: Send + Sync {
    /// Offers a batch, waiting for capacity if the queue applies backpressure.
    async fn offer(&self, batch: Vec<Record>) -> OfferResult;

    /// Stops accepting batches from this producer. Idempotent.
    fn complete(&self);

    /// Resolves once the consumer side stopped receiving, so batches it
    /// has not taken yet will never be processed.
    ///
    /// Queues that cannot observe their consumer never resolve.
    async fn closed(&self) {
        future::pending::<()>().await;
    }
}

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// What an offer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowStrategy {
    /// Wait until capacity frees up.
    #[default]
    Backpressure,
    /// Discard the offered batch and report `Dropped`.
    DropNew,
    /// Report `Failed`.
    Fail,
}

/// Queue configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of batches buffered.
    pub capacity: u32,
    /// Behavior when full.
    pub overflow: OverflowStrategy,
}

impl QueueConfig {
    /// Creates config with production defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: 64,
            overflow: OverflowStrategy::Backpressure,
        }
    }

    /// Creates config for testing with a tiny buffer.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            capacity: 2,
            overflow: OverflowStrategy::Backpressure,
        }
    }

    /// Builder: set capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder: set overflow strategy.
    #[must_use]
    pub const fn with_overflow(mut self, overflow: OverflowStrategy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Validates the config against system limits.
    ///
    /// # Errors
    /// Returns an error if the capacity is zero or exceeds the limit.
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidArgument {
                name: "capacity",
                reason: "must be positive",
            });
        }
        if self.capacity > limits.max_queue_capacity {
            return Err(Error::LimitExceeded {
                limit: "queue_capacity",
                max: u64::from(limits.max_queue_capacity),
                actual: u64::from(self.capacity),
            });
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Stats
// -----------------------------------------------------------------------------

/// Queue statistics shared by all handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Batches accepted.
    pub enqueued_batches: u64,
    /// Records accepted.
    pub enqueued_records: u64,
    /// Batches discarded because the queue was full.
    pub dropped_batches: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued_batches: AtomicU64,
    enqueued_records: AtomicU64,
    dropped_batches: AtomicU64,
}

// -----------------------------------------------------------------------------
// BoundedRecordQueue
// -----------------------------------------------------------------------------

/// Producer handle of a bounded record queue.
pub struct BoundedRecordQueue {
    config: QueueConfig,
    /// `None` once this handle completed.
    tx: Mutex<Option<mpsc::Sender<Vec<Record>>>>,
    termination: Termination,
    counters: Arc<QueueCounters>,
}

impl BoundedRecordQueue {
    /// Creates a queue and its consumer side.
    ///
    /// # Panics
    /// Panics if the capacity is zero.
    #[must_use]
    pub fn new(config: QueueConfig, termination: Termination) -> (Self, RecordReceiver) {
        // TigerStyle: Assert precondition.
        assert!(config.capacity > 0, "queue capacity must be positive");

        let (tx, rx) = mpsc::channel(config.capacity as usize);
        let queue = Self {
            config,
            tx: Mutex::new(Some(tx)),
            termination,
            counters: Arc::new(QueueCounters::default()),
        };
        (queue, RecordReceiver { rx })
    }

    /// Creates another producer handle feeding the same consumer.
    ///
    /// A handle created after this one completed starts out closed.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            config: self.config,
            tx: Mutex::new(lock(&self.tx).clone()),
            termination: self.termination.clone(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Returns the statistics shared by all handles of this queue.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued_batches: self.counters.enqueued_batches.load(Ordering::Relaxed),
            enqueued_records: self.counters.enqueued_records.load(Ordering::Relaxed),
            dropped_batches: self.counters.dropped_batches.load(Ordering::Relaxed),
        }
    }

    /// Returns true once this handle completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        lock(&self.tx).is_none()
    }

    fn record_enqueued(&self, records: usize) {
        self.counters.enqueued_batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .enqueued_records
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    async fn send_with_backpressure(
        &self,
        tx: mpsc::Sender<Vec<Record>>,
        batch: Vec<Record>,
    ) -> OfferResult {
        let records = batch.len();
        tokio::select! {
            biased;
            status = self.termination.terminated() => match status {
                PipelineStatus::Failed { cause } => OfferResult::Failed(cause),
                PipelineStatus::Running | PipelineStatus::Completed => OfferResult::QueueClosed,
            },
            sent = tx.send(batch) => match sent {
                Ok(()) => {
                    self.record_enqueued(records);
                    OfferResult::Enqueued
                }
                Err(_) => OfferResult::QueueClosed,
            },
        }
    }

    fn try_send(&self, tx: &mpsc::Sender<Vec<Record>>, batch: Vec<Record>) -> OfferResult {
        let records = batch.len();
        match tx.try_send(batch) {
            Ok(()) => {
                self.record_enqueued(records);
                OfferResult::Enqueued
            }
            Err(mpsc::error::TrySendError::Closed(_)) => OfferResult::QueueClosed,
            Err(mpsc::error::TrySendError::Full(_)) => match self.config.overflow {
                OverflowStrategy::DropNew => {
                    self.counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
                    debug!(records, "Queue full, batch dropped");
                    OfferResult::Dropped
                }
                OverflowStrategy::Fail | OverflowStrategy::Backpressure => OfferResult::Failed(
                    format!("queue full (capacity {} batches)", self.config.capacity),
                ),
            },
        }
    }
}

#[async_trait]
impl RecordQueue for BoundedRecordQueue {
    async fn offer(&self, batch: Vec<Record>) -> OfferResult {
        if let Some(cause) = self.termination.cause() {
            return OfferResult::Failed(cause);
        }
        let Some(tx) = lock(&self.tx).clone() else {
            return OfferResult::QueueClosed;
        };
        if batch.is_empty() {
            return OfferResult::Enqueued;
        }

        match self.config.overflow {
            OverflowStrategy::Backpressure => self.send_with_backpressure(tx, batch).await,
            OverflowStrategy::DropNew | OverflowStrategy::Fail => self.try_send(&tx, batch),
        }
    }

    fn complete(&self) {
        lock(&self.tx).take();
    }

    async fn closed(&self) {
        let tx = lock(&self.tx).clone();
        match tx {
            Some(tx) => tx.closed().await,
            None => future::pending().await,
        }
    }
}

impl fmt::Debug for BoundedRecordQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedRecordQueue")
            .field("config", &self.config)
            .field("completed", &self.is_completed())
            .field("stats", &self.stats())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// RecordReceiver
// -----------------------------------------------------------------------------

/// Consumer side of a bounded record queue.
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<Vec<Record>>,
}

impl RecordReceiver {
    /// Receives the next batch.
    ///
    /// Returns `None` once every producer handle completed and the buffer is
    /// drained.
    pub async fn recv(&mut self) -> Option<Vec<Record>> {
        self.rx.recv().await
    }

    /// Receives the next batch without waiting.
    pub fn try_recv(&mut self) -> Option<Vec<Record>> {
        self.rx.try_recv().ok()
    }

    /// Stops accepting batches. Buffered batches can still be received;
    /// further offers report `QueueClosed`.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use riffle_core::{Position, SequenceNumber};

    use super::*;
    use crate::kill_switch::KillSwitch;

    fn batch(seqs: std::ops::Range<u128>) -> Vec<Record> {
        seqs.map(|seq| {
            Record::new(
                Position::new(SequenceNumber::from_u128(seq)),
                "key",
                Bytes::from_static(b"v"),
            )
        })
        .collect()
    }

    fn queue(config: QueueConfig) -> (BoundedRecordQueue, RecordReceiver, KillSwitch) {
        let kill_switch = KillSwitch::new();
        let (queue, rx) = BoundedRecordQueue::new(config, kill_switch.termination());
        (queue, rx, kill_switch)
    }

    #[test]
    fn test_config_validation() {
        let limits = Limits::default();
        assert!(QueueConfig::new().validate(&limits).is_ok());
        assert!(QueueConfig::new().with_capacity(0).validate(&limits).is_err());
        assert!(matches!(
            QueueConfig::new()
                .with_capacity(limits.max_queue_capacity + 1)
                .validate(&limits),
            Err(Error::LimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_offer_and_receive() {
        let (queue, mut rx, _kill_switch) = queue(QueueConfig::for_testing());

        assert_eq!(queue.offer(batch(0..3)).await, OfferResult::Enqueued);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(
            queue.stats(),
            QueueStats {
                enqueued_batches: 1,
                enqueued_records: 3,
                dropped_batches: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backpressure_waits_for_capacity() {
        let (queue, mut rx, _kill_switch) = queue(QueueConfig::for_testing());
        let queue = Arc::new(queue);

        queue.offer(batch(0..1)).await;
        queue.offer(batch(1..2)).await;

        // Third offer blocks until the consumer takes a batch.
        let producer = Arc::clone(&queue);
        let offer = tokio::spawn(async move { producer.offer(batch(2..3)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!offer.is_finished());

        rx.recv().await.unwrap();
        assert_eq!(offer.await.unwrap(), OfferResult::Enqueued);
        assert_eq!(queue.stats().enqueued_batches, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_releases_blocked_offer() {
        let (queue, _rx, kill_switch) = queue(QueueConfig::new().with_capacity(1));
        let queue = Arc::new(queue);
        queue.offer(batch(0..1)).await;

        let producer = Arc::clone(&queue);
        let offer = tokio::spawn(async move { producer.offer(batch(1..2)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!offer.is_finished());

        kill_switch.abort("consumer crashed");
        assert_eq!(
            offer.await.unwrap(),
            OfferResult::Failed("consumer crashed".to_string())
        );
    }

    #[tokio::test]
    async fn test_offer_after_abort_fails() {
        let (queue, _rx, kill_switch) = queue(QueueConfig::for_testing());
        kill_switch.abort("boom");
        assert_eq!(
            queue.offer(batch(0..1)).await,
            OfferResult::Failed("boom".to_string())
        );
    }

    #[tokio::test]
    async fn test_drop_new_when_full() {
        let (queue, _rx, _kill_switch) = queue(
            QueueConfig::new()
                .with_capacity(1)
                .with_overflow(OverflowStrategy::DropNew),
        );

        assert_eq!(queue.offer(batch(0..1)).await, OfferResult::Enqueued);
        assert_eq!(queue.offer(batch(1..2)).await, OfferResult::Dropped);
        assert_eq!(queue.stats().dropped_batches, 1);
    }

    #[tokio::test]
    async fn test_fail_when_full() {
        let (queue, _rx, _kill_switch) = queue(
            QueueConfig::new()
                .with_capacity(1)
                .with_overflow(OverflowStrategy::Fail),
        );

        queue.offer(batch(0..1)).await;
        assert!(matches!(
            queue.offer(batch(1..2)).await,
            OfferResult::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_complete_is_idempotent_and_closes_handle() {
        let (queue, mut rx, _kill_switch) = queue(QueueConfig::for_testing());

        queue.complete();
        queue.complete();
        assert!(queue.is_completed());
        assert_eq!(queue.offer(batch(0..1)).await, OfferResult::QueueClosed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_receiver_ends_after_every_handle_completes() {
        let (root, mut rx, _kill_switch) = queue(QueueConfig::for_testing());
        let shard_a = root.handle();
        let shard_b = root.handle();
        root.complete();

        shard_a.offer(batch(0..1)).await;
        shard_a.complete();
        assert_eq!(shard_b.offer(batch(10..12)).await, OfferResult::Enqueued);
        shard_b.complete();

        assert_eq!(rx.recv().await.unwrap().len(), 1);
        assert_eq!(rx.recv().await.unwrap().len(), 2);
        assert!(rx.recv().await.is_none());
        assert_eq!(root.stats().enqueued_records, 3);
    }

    #[tokio::test]
    async fn test_closed_receiver_reports_queue_closed() {
        let (queue, mut rx, _kill_switch) = queue(QueueConfig::for_testing());
        rx.close();
        assert_eq!(queue.offer(batch(0..1)).await, OfferResult::QueueClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_resolves_when_receiver_goes_away() {
        let (queue, rx, _kill_switch) = queue(QueueConfig::for_testing());
        let queue = Arc::new(queue);

        let watcher = Arc::clone(&queue);
        let closed = tokio::spawn(async move { watcher.closed().await });
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!closed.is_finished());

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), closed)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_offer_result_display() {
        assert_eq!(OfferResult::Dropped.to_string(), "dropped");
        assert_eq!(
            OfferResult::Failed("full".to_string()).to_string(),
            "failed: full"
        );
    }
}
