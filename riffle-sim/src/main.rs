//! Riffle simulation binary.
//!
//! Runs a simulated delivery framework against the consumption bridge and
//! prints what was consumed and checkpointed.
//!
//! ```bash
//! riffle-sim --shards 4 --batches 50 --batch-size 100 --fail-rate 0.05
//! riffle-sim --shutdown requested --shutdown-wait-ms 200 --log-level debug
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use clap::{Parser, ValueEnum};
use riffle_bridge::{BridgeConfig, ShutdownReason};
use riffle_checkpoint::{CheckpointCall, CheckpointConfig};
use riffle_flow::{PipelineStatus, QueueConfig};
use riffle_sim::{SimConfig, SimulationReport};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// How shards are released at the end of the run.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Shutdown {
    /// Lease lost: no drain, no checkpoint.
    Zombie,
    /// Shard exhausted: drain, then checkpoint the shard end.
    #[default]
    Terminate,
    /// Requested: bounded drain, then checkpoint.
    Requested,
}

impl From<Shutdown> for ShutdownReason {
    fn from(shutdown: Shutdown) -> Self {
        match shutdown {
            Shutdown::Zombie => Self::Zombie,
            Shutdown::Terminate => Self::Terminate,
            Shutdown::Requested => Self::Requested,
        }
    }
}

/// Riffle consumption bridge simulator.
#[derive(Parser, Debug)]
#[command(name = "riffle-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Application name used in partition identities.
    #[arg(long, default_value = "riffle-sim")]
    application: String,

    /// Number of shards driven concurrently.
    #[arg(long, default_value = "4")]
    shards: u32,

    /// Batches delivered per shard.
    #[arg(long, default_value = "20")]
    batches: u32,

    /// Records per batch.
    #[arg(long, default_value = "50")]
    batch_size: u32,

    /// Queue capacity in batches.
    #[arg(long, default_value = "8")]
    queue_capacity: u32,

    /// Checkpoint after this many completed records.
    #[arg(long, default_value = "100")]
    checkpoint_batch_size: u32,

    /// Checkpoint after this many milliseconds.
    #[arg(long, default_value = "1000")]
    checkpoint_wait_ms: u64,

    /// How long a requested shutdown waits for in-flight records.
    #[arg(long, default_value = "5000")]
    shutdown_wait_ms: u64,

    /// Microseconds the consumer spends per record.
    #[arg(long, default_value = "100")]
    consumer_delay_us: u64,

    /// Probability that a checkpoint call is throttled.
    #[arg(long, default_value = "0.0")]
    fail_rate: f64,

    /// How shards are released at the end of the run.
    #[arg(long, value_enum, default_value = "terminate")]
    shutdown: Shutdown,

    /// Seed for every random choice.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        let checkpoint = CheckpointConfig::new()
            .with_max_batch_size(self.checkpoint_batch_size)
            .with_max_batch_wait(Duration::from_millis(self.checkpoint_wait_ms))
            .with_shutdown_wait(Duration::from_millis(self.shutdown_wait_ms));
        let queue = QueueConfig::new().with_capacity(self.queue_capacity);

        SimConfig {
            bridge: BridgeConfig::new(self.application.clone())
                .with_checkpoint(checkpoint)
                .with_queue(queue),
            shards: self.shards,
            batches_per_shard: self.batches,
            batch_size: self.batch_size,
            consumer_delay: Duration::from_micros(self.consumer_delay_us),
            checkpoint_fail_rate: self.fail_rate,
            shutdown_reason: self.shutdown.into(),
            seed: self.seed,
        }
    }
}

fn print_report(report: &SimulationReport) {
    eprintln!("\n=== Simulation Summary ===\n");
    eprintln!("Pipeline: {}", report.pipeline);
    eprintln!("Records consumed: {}", report.consumed);
    eprintln!(
        "Queue: {} batches / {} records enqueued, {} dropped",
        report.queue.enqueued_batches, report.queue.enqueued_records, report.queue.dropped_batches
    );
    eprintln!(
        "Checkpoints: {} acked, {} delayed, {} failed, {} shard ends",
        report.stats.checkpoints_acked,
        report.stats.checkpoints_delayed,
        report.stats.checkpoints_failed,
        report.stats.shard_ends_acked
    );

    eprintln!("\nShards:");
    for shard in &report.shards {
        let last = match shard.checkpoints.last() {
            Some(CheckpointCall::Position(position)) => position.to_string(),
            Some(CheckpointCall::ShardEnd) => "SHARD_END".to_string(),
            None => "-".to_string(),
        };
        eprintln!(
            "  {}: delivered={} checkpoints={} last={last}",
            shard.shard_id,
            shard.delivered,
            shard.checkpoints.len()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Log to stderr so the summary stays readable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        application = %args.application,
        shards = args.shards,
        shutdown = ?args.shutdown,
        seed = args.seed,
        "Starting riffle simulation"
    );

    let report = riffle_sim::run(args.sim_config()).await?;
    print_report(&report);

    if let PipelineStatus::Failed { cause } = &report.pipeline {
        return Err(format!("pipeline aborted: {cause}").into());
    }
    Ok(())
}
