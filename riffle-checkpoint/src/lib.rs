//! Checkpoint tracking for Riffle.
//!
//! This crate decides when it is safe and worthwhile to persist a shard's
//! consumption progress.
//!
//! # Overview
//!
//! Records are delivered in order but completed downstream in any order. The
//! [`CheckpointTracker`] keeps delivered records in a FIFO and only ever
//! evicts a completed *prefix*: a record leaves the front once it and every
//! record delivered before it has completed. The most recently evicted record
//! is the only position that may be checkpointed, so acknowledged progress
//! never skips an incomplete record.
//!
//! A checkpoint is due once enough records have been evicted since the last
//! attempt, or enough time has passed:
//!
//! ```text
//! in flight:  [1 ✓] [2 ✓] [3 ·] [4 ✓]
//!              └─ evicted ─┘  └ stays until 3 completes
//! pending checkpoint: 2
//! ```
//!
//! # Example
//!
//! ```ignore
//! use riffle_checkpoint::{CheckpointConfig, CheckpointTracker, SimulatedCheckpointer};
//!
//! let mut tracker = CheckpointTracker::new(CheckpointConfig::for_testing());
//! tracker.watch_for_completion(records.iter().cloned());
//!
//! if tracker.should_checkpoint() {
//!     let checkpointer = SimulatedCheckpointer::new(42);
//!     tracker.checkpoint_last_completed_record(&checkpointer).await?;
//! }
//! ```
//!
//! # Failure Classification
//!
//! Persistence failures are classified by [`CheckpointError::disposition`]:
//! moot (ownership already lost), transient (retry at the next evaluation),
//! or fatal (the pipeline must abort).

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod checkpointer;
mod config;
mod error;
mod tracker;

// Re-export public API.
pub use checkpointer::{
    CheckpointCall, Checkpointer, CheckpointerFaultConfig, SimulatedCheckpointer,
};
pub use config::CheckpointConfig;
pub use error::{CheckpointError, CheckpointResult, FailureDisposition};
pub use tracker::CheckpointTracker;
