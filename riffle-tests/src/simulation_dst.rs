//! Full simulation runs across seeds.
//!
//! Each run drives several shards through the bridge factory with a shared
//! queue, a randomly ordered consumer and a flaky checkpointer, then checks
//! the persisted checkpoints of every shard.

use riffle_bridge::ShutdownReason;
use riffle_checkpoint::CheckpointCall;
use riffle_core::{Position, SequenceNumber};
use riffle_flow::PipelineStatus;
use riffle_sim::{SimConfig, SimulationReport, SEQUENCE_BASE};

use crate::properties::check_checkpoints_monotonic;
use crate::scenarios::seeds;

fn flaky_config(seed: u64, reason: ShutdownReason) -> SimConfig {
    let mut config = SimConfig::for_testing(seed);
    config.checkpoint_fail_rate = 0.1;
    config.shutdown_reason = reason;
    config
}

fn assert_monotonic(report: &SimulationReport, seed: u64) {
    for shard in &report.shards {
        if let Err(violation) = check_checkpoints_monotonic(&shard.checkpoints) {
            panic!("seed {seed}, {}: {violation}", shard.shard_id);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_dst_simulation_terminate() {
    for &seed in seeds::REGRESSION_SEEDS {
        let report = riffle_sim::run(flaky_config(seed, ShutdownReason::Terminate))
            .await
            .unwrap();

        // Throttled checkpoints are retried later, never fatal.
        assert_eq!(report.pipeline, PipelineStatus::Completed, "seed {seed}");
        assert_eq!(report.consumed, 3 * 5 * 4, "seed {seed}");
        assert_monotonic(&report, seed);

        let ended = report
            .shards
            .iter()
            .filter(|shard| shard.checkpoints.last() == Some(&CheckpointCall::ShardEnd))
            .count() as u64;
        assert_eq!(ended, report.stats.shard_ends_acked, "seed {seed}");
        assert!(
            ended == 3 || report.stats.checkpoints_delayed > 0,
            "seed {seed}: shard end missing without a delayed checkpoint"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_dst_simulation_terminate_without_faults() {
    for &seed in seeds::REGRESSION_SEEDS {
        let report = riffle_sim::run(SimConfig::for_testing(seed)).await.unwrap();

        assert_monotonic(&report, seed);
        for shard in &report.shards {
            assert_eq!(
                shard.checkpoints.last(),
                Some(&CheckpointCall::ShardEnd),
                "seed {seed}, {}",
                shard.shard_id
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_dst_simulation_requested() {
    for &seed in seeds::REGRESSION_SEEDS {
        let report = riffle_sim::run(flaky_config(seed, ShutdownReason::Requested))
            .await
            .unwrap();

        assert_eq!(report.pipeline, PipelineStatus::Completed, "seed {seed}");
        assert_monotonic(&report, seed);
        for shard in &report.shards {
            let bound = Position::new(SequenceNumber::from_u128(
                SEQUENCE_BASE + u128::from(shard.delivered) - 1,
            ));
            for call in &shard.checkpoints {
                match call {
                    CheckpointCall::Position(position) => {
                        assert!(position <= &bound, "seed {seed}: {position} past {bound}");
                    }
                    CheckpointCall::ShardEnd => {
                        panic!("seed {seed}: requested shutdown ended the shard");
                    }
                }
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_dst_simulation_zombie() {
    for &seed in seeds::REGRESSION_SEEDS {
        let report = riffle_sim::run(flaky_config(seed, ShutdownReason::Zombie))
            .await
            .unwrap();

        assert_eq!(report.pipeline, PipelineStatus::Completed, "seed {seed}");
        assert_eq!(report.stats.shutdowns_zombie, 3, "seed {seed}");
        assert_monotonic(&report, seed);
        for shard in &report.shards {
            assert!(
                !shard.checkpoints.contains(&CheckpointCall::ShardEnd),
                "seed {seed}: zombie shard {} ended",
                shard.shard_id
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_dst_simulation_many_shards() {
    let mut config = flaky_config(0xC0FFEE, ShutdownReason::Terminate);
    config.shards = 16;
    config.batches_per_shard = 20;
    config.batch_size = 10;

    let report = riffle_sim::run(config).await.unwrap();

    assert_eq!(report.shards.len(), 16);
    assert_eq!(report.consumed, 16 * 20 * 10);
    assert_eq!(report.queue.enqueued_records, 16 * 20 * 10);
    assert_monotonic(&report, 0xC0FFEE);
}
