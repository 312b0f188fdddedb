//! Riffle Tests - Deterministic simulation and integration tests for Riffle.
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): seeded randomized runs with fault injection
//! - `tracker_dst`: prefix eviction and trigger semantics under random
//!   completion orders
//! - `simulation_dst`: full simulated framework runs across seeds
//!
//! **Integration Tests** (`*_tests.rs`): multi-crate behavior
//! - `bridge_tests`: shutdown state machine and failure containment
//!
//! **Support Modules**:
//! - `scenarios`: seeds and a shard harness shared by the tests
//! - `properties`: checkers for tracker and checkpoint invariants
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;

#[cfg(test)]
mod simulation_dst;
#[cfg(test)]
mod tracker_dst;
