//! Simulated delivery framework for Riffle.
//!
//! Drives several shards through `ConsumptionBridge`s the way a lease-owning
//! delivery framework would: initialize, a run of batches, then shutdown.
//! A consumer task drains the shared queue and marks records processed in a
//! seeded random order, so completions arrive out of delivery order.
//!
//! Everything random is derived from one seed, so a run can be replayed.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use riffle_bridge::{
    BridgeConfig, BridgeFactory, CountingStats, DeliveredRecord, InitializationInput,
    ProcessRecordsInput, RecordProcessor, RecordProcessorFactory, ShutdownInput, ShutdownReason,
    StatsReporter, StatsSnapshot,
};
use riffle_checkpoint::{CheckpointCall, CheckpointerFaultConfig, SimulatedCheckpointer};
use riffle_core::{ShardId, Timestamp};
use riffle_flow::{KillSwitch, PipelineStatus, QueueStats, RecordReceiver};
use tracing::{debug, info};

/// First sequence number handed out on every shard.
///
/// Larger than `u64::MAX`, as real stream sequence numbers are.
pub const SEQUENCE_BASE: u128 = 49_590_338_271_490_256_608_559_692_538_361_571_095;

/// Errors that end a simulation early.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The bridge configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] riffle_core::Error),

    /// A simulated task panicked or was cancelled.
    #[error("simulation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Bridge settings shared by every shard.
    pub bridge: BridgeConfig,
    /// Number of shards driven concurrently.
    pub shards: u32,
    /// Batches delivered per shard.
    pub batches_per_shard: u32,
    /// Records per batch.
    pub batch_size: u32,
    /// Time the consumer spends per record.
    pub consumer_delay: Duration,
    /// Probability that a checkpoint call fails transiently.
    pub checkpoint_fail_rate: f64,
    /// How each shard is released.
    pub shutdown_reason: ShutdownReason,
    /// Seed for every random choice.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a small, fast simulation.
    #[must_use]
    pub fn for_testing(seed: u64) -> Self {
        Self {
            bridge: BridgeConfig::for_testing(),
            shards: 3,
            batches_per_shard: 5,
            batch_size: 4,
            consumer_delay: Duration::from_millis(1),
            checkpoint_fail_rate: 0.0,
            shutdown_reason: ShutdownReason::Terminate,
            seed,
        }
    }
}

/// What happened to one shard.
#[derive(Debug, Clone)]
pub struct ShardOutcome {
    /// The shard.
    pub shard_id: ShardId,
    /// Records delivered.
    pub delivered: u64,
    /// Checkpoints persisted, in order.
    pub checkpoints: Vec<CheckpointCall>,
}

/// Result of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Per-shard outcomes, ordered by shard.
    pub shards: Vec<ShardOutcome>,
    /// Bridge stats.
    pub stats: StatsSnapshot,
    /// Queue stats.
    pub queue: QueueStats,
    /// Records the consumer marked processed.
    pub consumed: u64,
    /// Final pipeline status.
    pub pipeline: PipelineStatus,
}

/// Runs one simulation to completion.
///
/// # Errors
/// Returns an error if the config is invalid or a simulated task panicked.
pub async fn run(config: SimConfig) -> Result<SimulationReport, SimError> {
    let kill_switch = KillSwitch::new();
    let stats = Arc::new(CountingStats::new());
    let (factory, receiver) = BridgeFactory::new(
        config.bridge.clone(),
        kill_switch.clone(),
        Arc::clone(&stats) as Arc<dyn StatsReporter>,
    )?;

    info!(
        shards = config.shards,
        batches_per_shard = config.batches_per_shard,
        batch_size = config.batch_size,
        seed = config.seed,
        "Starting simulation"
    );

    let consumer = tokio::spawn(consume(receiver, config.consumer_delay, config.seed));

    let mut drivers = Vec::with_capacity(config.shards as usize);
    for shard in 0..config.shards {
        let checkpointer = SimulatedCheckpointer::with_faults(
            config.seed.wrapping_add(u64::from(shard)),
            CheckpointerFaultConfig::none().with_fail_rate(config.checkpoint_fail_rate),
        );
        drivers.push(tokio::spawn(drive_shard(
            factory.create_processor(),
            ShardId::new(format!("shardId-{shard:012}")),
            checkpointer,
            config.clone(),
        )));
    }
    factory.close();

    let mut shards = Vec::with_capacity(drivers.len());
    for driver in drivers {
        shards.push(driver.await?);
    }
    let consumed = consumer.await?;
    kill_switch.shutdown();

    Ok(SimulationReport {
        shards,
        stats: stats.snapshot(),
        queue: factory.queue().stats(),
        consumed,
        pipeline: kill_switch.status(),
    })
}

/// Plays the delivery framework for one shard.
async fn drive_shard(
    mut processor: Box<dyn RecordProcessor>,
    shard_id: ShardId,
    checkpointer: SimulatedCheckpointer,
    config: SimConfig,
) -> ShardOutcome {
    let shared: Arc<SimulatedCheckpointer> = Arc::new(checkpointer.clone());

    processor
        .initialize(InitializationInput {
            shard_id: shard_id.clone(),
            starting_position: None,
        })
        .await;

    let mut next = SEQUENCE_BASE;
    let mut delivered = 0u64;
    for batch in 0..config.batches_per_shard {
        let records: Vec<_> = (0..config.batch_size)
            .map(|i| {
                let sequence = next + u128::from(i);
                DeliveredRecord::new(
                    sequence.to_string(),
                    format!("key-{}", sequence % 16),
                    Bytes::from(format!("{shard_id}/{batch}/{i}")),
                )
                .with_arrival(Timestamp::now())
            })
            .collect();
        next += u128::from(config.batch_size);
        delivered += records.len() as u64;

        let behind = u64::from(config.batches_per_shard - batch - 1) * 1_000;
        processor
            .process_records(ProcessRecordsInput {
                records,
                millis_behind_latest: Some(behind),
                checkpointer: shared.clone(),
            })
            .await;
    }

    processor
        .shutdown(ShutdownInput {
            reason: config.shutdown_reason,
            checkpointer: shared,
        })
        .await;

    debug!(shard = %shard_id, delivered, "Shard driver finished");
    ShardOutcome {
        shard_id,
        delivered,
        checkpoints: checkpointer.persisted(),
    }
}

/// Drains the queue, completing each batch's records in random order.
async fn consume(mut receiver: RecordReceiver, delay: Duration, seed: u64) -> u64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut consumed = 0u64;

    while let Some(mut batch) = receiver.recv().await {
        batch.shuffle(&mut rng);
        for record in batch {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if record.mark_processed() {
                consumed += 1;
            }
        }
    }

    debug!(consumed, "Consumer finished");
    consumed
}

#[cfg(test)]
mod tests {
    use riffle_core::{Position, SequenceNumber};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_terminate_run_ends_every_shard() {
        let report = run(SimConfig::for_testing(42)).await.unwrap();

        assert_eq!(report.shards.len(), 3);
        assert_eq!(report.consumed, 3 * 5 * 4);
        assert_eq!(report.pipeline, PipelineStatus::Completed);
        for shard in &report.shards {
            assert_eq!(shard.delivered, 20);
            assert_eq!(shard.checkpoints.last(), Some(&CheckpointCall::ShardEnd));
        }
        assert_eq!(report.stats.shard_ends_acked, 3);
        assert_eq!(report.stats.shutdowns_terminate, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_run_checkpoints_last_record() {
        let mut config = SimConfig::for_testing(7);
        config.shutdown_reason = ShutdownReason::Requested;
        let report = run(config).await.unwrap();

        let last = Position::new(SequenceNumber::from_u128(SEQUENCE_BASE + 19));
        for shard in &report.shards {
            assert_eq!(
                shard.checkpoints.last(),
                Some(&CheckpointCall::Position(last.clone()))
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = SimConfig::for_testing(1);
        config.bridge.application_name = String::new();
        assert!(matches!(run(config).await, Err(SimError::Config(_))));
    }
}
