//! Reusable test scenarios for Riffle.
//!
//! Seeds, record builders and a single-shard harness that wires a
//! `ConsumptionBridge` to a simulated checkpointer, a kill switch and
//! counting stats.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use riffle_bridge::{
    BridgeConfig, ConsumptionBridge, CountingStats, DeliveredRecord, InitializationInput,
    ProcessRecordsInput, RecordProcessor, ShutdownInput, ShutdownReason, StatsReporter,
};
use riffle_checkpoint::SimulatedCheckpointer;
use riffle_core::{Position, Record, SequenceNumber, ShardId};
use riffle_flow::{BoundedRecordQueue, KillSwitch, OfferResult, RecordQueue, RecordReceiver};

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of random seeds to test in CI.
    pub const CI_SEED_COUNT: u32 = 50;
}

/// Returns the position of a plain record with sequence number `seq`.
#[must_use]
pub fn position(seq: u128) -> Position {
    Position::new(SequenceNumber::from_u128(seq))
}

/// Builds translated records with consecutive sequence numbers.
#[must_use]
pub fn records(seqs: std::ops::RangeInclusive<u128>) -> Vec<Record> {
    seqs.map(|seq| Record::new(position(seq), format!("key-{seq}"), Bytes::from_static(b"v")))
        .collect()
}

/// Builds framework records with consecutive sequence numbers.
#[must_use]
pub fn delivered(seqs: std::ops::RangeInclusive<u128>) -> Vec<DeliveredRecord> {
    seqs.map(|seq| DeliveredRecord::new(seq.to_string(), format!("key-{seq}"), Bytes::new()))
        .collect()
}

// -----------------------------------------------------------------------------
// Scripted Queue
// -----------------------------------------------------------------------------

/// A queue that answers every offer with a fixed result and keeps what it
/// accepted.
#[derive(Debug)]
pub struct ScriptedQueue {
    result: OfferResult,
    accepted: Arc<Mutex<Vec<Record>>>,
    completions: Arc<Mutex<u32>>,
}

impl ScriptedQueue {
    /// Creates a queue answering every offer with `result`.
    #[must_use]
    pub fn new(result: OfferResult) -> Self {
        Self {
            result,
            accepted: Arc::new(Mutex::new(Vec::new())),
            completions: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns a view sharing this queue's observations.
    #[must_use]
    pub fn observer(&self) -> QueueObserver {
        QueueObserver {
            accepted: Arc::clone(&self.accepted),
            completions: Arc::clone(&self.completions),
        }
    }
}

#[async_trait]
impl RecordQueue for ScriptedQueue {
    async fn offer(&self, batch: Vec<Record>) -> OfferResult {
        if self.result == OfferResult::Enqueued {
            self.accepted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(batch);
        }
        self.result.clone()
    }

    fn complete(&self) {
        *self
            .completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// Read side of a `ScriptedQueue`.
#[derive(Debug, Clone)]
pub struct QueueObserver {
    accepted: Arc<Mutex<Vec<Record>>>,
    completions: Arc<Mutex<u32>>,
}

impl QueueObserver {
    /// Returns the records accepted so far.
    #[must_use]
    pub fn accepted(&self) -> Vec<Record> {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns how often `complete` was called.
    #[must_use]
    pub fn completions(&self) -> u32 {
        *self
            .completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// -----------------------------------------------------------------------------
// Shard Harness
// -----------------------------------------------------------------------------

/// One bridge plus everything it talks to.
pub struct ShardHarness {
    /// The bridge under test.
    pub bridge: ConsumptionBridge,
    /// Pipeline kill switch.
    pub kill_switch: KillSwitch,
    /// Counting stats shared with the bridge.
    pub stats: Arc<CountingStats>,
    /// Checkpointer handed to every callback.
    pub checkpointer: SimulatedCheckpointer,
}

impl ShardHarness {
    /// Creates a harness around an arbitrary queue.
    #[must_use]
    pub fn with_queue(
        config: BridgeConfig,
        queue: Box<dyn RecordQueue>,
        kill_switch: KillSwitch,
    ) -> Self {
        Self::with_stats(config, queue, kill_switch, Arc::new(CountingStats::new()))
    }

    /// Creates a harness with caller-provided counting stats.
    #[must_use]
    pub fn with_stats(
        config: BridgeConfig,
        queue: Box<dyn RecordQueue>,
        kill_switch: KillSwitch,
        stats: Arc<CountingStats>,
    ) -> Self {
        let bridge = ConsumptionBridge::new(
            config,
            queue,
            kill_switch.clone(),
            Arc::clone(&stats) as Arc<dyn StatsReporter>,
        );
        Self {
            bridge,
            kill_switch,
            stats,
            checkpointer: SimulatedCheckpointer::new(42),
        }
    }

    /// Creates a harness around a bounded queue and returns its receiver.
    #[must_use]
    pub fn bounded(config: BridgeConfig) -> (Self, RecordReceiver) {
        let kill_switch = KillSwitch::new();
        let (queue, receiver) = BoundedRecordQueue::new(config.queue, kill_switch.termination());
        (Self::with_queue(config, Box::new(queue), kill_switch), receiver)
    }

    /// Initializes the bridge for `shard-0`.
    pub async fn initialize(&mut self) {
        self.bridge
            .initialize(InitializationInput {
                shard_id: ShardId::new("shard-0"),
                starting_position: None,
            })
            .await;
    }

    /// Delivers one batch.
    pub async fn deliver(&mut self, records: Vec<DeliveredRecord>) {
        self.bridge
            .process_records(ProcessRecordsInput {
                records,
                millis_behind_latest: None,
                checkpointer: Arc::new(self.checkpointer.clone()),
            })
            .await;
    }

    /// Shuts the bridge down.
    pub async fn shutdown(&mut self, reason: ShutdownReason) {
        self.bridge
            .shutdown(ShutdownInput {
                reason,
                checkpointer: Arc::new(self.checkpointer.clone()),
            })
            .await;
    }
}
