//! Per-shard consumption bridge for Riffle.
//!
//! A delivery framework owns shard leases and pushes batches of records into
//! a [`RecordProcessor`]. [`ConsumptionBridge`] is that processor: it turns
//! each delivered batch into a backpressured offer on a bounded record queue,
//! tracks which delivered records are still in flight downstream, and
//! persists checkpoints only up to the last record whose predecessors have
//! all completed.
//!
//! # Lifecycle
//!
//! ```text
//!  Initializing ──initialize──▶ Processing ──shutdown(reason)──▶ Terminated
//!                                 │    ▲
//!                                 └────┘ process_records
//! ```
//!
//! How a shard shuts down depends on why:
//!
//! | Reason | Wait for in-flight records | Checkpoint |
//! |--------|----------------------------|------------|
//! | `Zombie` | no | none |
//! | `Terminate` | until done, the pipeline terminates or the queue closes | shard end if all done, else last completed |
//! | `Requested` | up to `shutdown_wait`, skipped if the pipeline failed | last completed |
//!
//! # Failure Containment
//!
//! Nothing a callback does propagates back into the delivery framework.
//! Errors and panics are logged and converted into a pipeline-wide abort via
//! the [`riffle_flow::KillSwitch`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod bridge;
mod config;
mod error;
mod factory;
mod processor;
mod stats;

pub use bridge::{BridgeState, ConsumptionBridge};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use factory::BridgeFactory;
pub use processor::{
    DeliveredRecord, InitializationInput, ProcessRecordsInput, RecordProcessor,
    RecordProcessorFactory, ShutdownInput, ShutdownReason,
};
pub use stats::{CountingStats, NoopStats, StatsReporter, StatsSnapshot, TracingStats};
