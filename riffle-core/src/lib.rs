//! Riffle Core - Strongly-typed identifiers, records and limits for Riffle.
//!
//! Riffle bridges a push-based shard delivery framework (which hands over
//! batches of records and periodically demands checkpoints) into a pull-based,
//! backpressured queue. This crate holds the vocabulary shared by every other
//! Riffle crate:
//!
//! - **Identifiers**: `ShardId`, `SequenceNumber`, `Position`, `PartitionIdentity`
//! - **Records**: `Record` with its single-fire `Completion` signal
//! - **Limits**: explicit upper bounds used to validate configuration
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: A sequence number is never confused with a shard id
//! - **Explicit limits**: Every queue and threshold has a bounded maximum
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod record;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use record::{Completion, Record, Timestamp};
pub use types::{PartitionIdentity, Position, SequenceNumber, ShardId};
