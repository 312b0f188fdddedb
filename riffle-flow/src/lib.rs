//! Flow control for Riffle.
//!
//! This crate holds the two pipeline primitives a consumption bridge pushes
//! into:
//!
//! - **Bounded record queue**: a bounded channel of record batches. Offers
//!   wait for capacity (or drop / fail, per the overflow strategy), which is
//!   how backpressure reaches the delivery framework.
//! - **Kill switch**: a pipeline-wide abort primitive with an observable
//!   termination signal.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   offer()   ┌──────────────────────┐   recv()   ┌──────────┐
//! │ shard bridge │────────────▶│                      │───────────▶│          │
//! ├──────────────┤   offer()   │  BoundedRecordQueue  │            │ consumer │
//! │ shard bridge │────────────▶│   (mpsc, batches)    │            │          │
//! └──────────────┘             └──────────▲───────────┘            └────┬─────┘
//!                                         │ races                       │
//!                                  ┌──────┴──────┐       abort()        │
//!                                  │ Termination │◀─────────────────────┘
//!                                  └─────────────┘     (KillSwitch)
//! ```
//!
//! # Example
//!
//! ```rust
//! use riffle_flow::{BoundedRecordQueue, KillSwitch, OfferResult, QueueConfig, RecordQueue};
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let kill_switch = KillSwitch::new();
//! let (queue, mut receiver) =
//!     BoundedRecordQueue::new(QueueConfig::for_testing(), kill_switch.termination());
//!
//! assert_eq!(queue.offer(Vec::new()).await, OfferResult::Enqueued);
//! queue.complete();
//! assert!(receiver.recv().await.is_none());
//! # });
//! # }
//! ```

#![warn(missing_docs)]

pub mod kill_switch;
pub mod queue;

// Re-export main types for convenience.
pub use kill_switch::{KillSwitch, PipelineStatus, Termination};
pub use queue::{
    BoundedRecordQueue, OfferResult, OverflowStrategy, QueueConfig, QueueStats, RecordQueue,
    RecordReceiver,
};
