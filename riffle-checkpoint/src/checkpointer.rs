//! Checkpoint persistence abstraction.
//!
//! Provides the `Checkpointer` trait through which the delivery framework
//! persists shard progress, and `SimulatedCheckpointer` for deterministic
//! simulation testing.

#![allow(clippy::significant_drop_tightening)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use riffle_core::Position;

use crate::error::{CheckpointError, CheckpointResult};

// -----------------------------------------------------------------------------
// Checkpointer Trait
// -----------------------------------------------------------------------------

/// Checkpoint persistence capability handed over by the delivery framework.
///
/// Implementations own the durable store; Riffle only decides what to
/// persist and when.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persists progress up to and including `position`.
    async fn checkpoint(&self, position: &Position) -> CheckpointResult<()>;

    /// Persists the terminal "end of shard" marker.
    ///
    /// After this succeeds the shard is never read again.
    async fn checkpoint_shard_end(&self) -> CheckpointResult<()>;
}

/// One persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointCall {
    /// A positional checkpoint.
    Position(Position),
    /// The terminal end-of-shard marker.
    ShardEnd,
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Fault configuration for the simulated checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerFaultConfig {
    /// Probability of any checkpoint call failing (0.0 - 1.0).
    pub fail_rate: f64,
    /// Error returned by probabilistic failures.
    pub random_error: CheckpointError,
    /// Errors returned by the next calls, one per call (one-shot each).
    pub forced: VecDeque<CheckpointError>,
}

impl CheckpointerFaultConfig {
    /// No faults (all calls succeed).
    #[must_use]
    pub fn none() -> Self {
        Self {
            fail_rate: 0.0,
            random_error: CheckpointError::Throttled {
                message: "simulated throttling (random)".into(),
            },
            forced: VecDeque::new(),
        }
    }

    /// Flaky configuration: 5% of calls are throttled.
    #[must_use]
    pub fn flaky() -> Self {
        Self::none().with_fail_rate(0.05)
    }

    /// Builder: set fail rate.
    #[must_use]
    pub fn with_fail_rate(mut self, rate: f64) -> Self {
        self.fail_rate = rate;
        self
    }

    /// Builder: set the error used for probabilistic failures.
    #[must_use]
    pub fn with_random_error(mut self, error: CheckpointError) -> Self {
        self.random_error = error;
        self
    }
}

impl Default for CheckpointerFaultConfig {
    fn default() -> Self {
        Self::none()
    }
}

// -----------------------------------------------------------------------------
// Simulated Checkpointer
// -----------------------------------------------------------------------------

/// In-memory simulated checkpointer for DST.
///
/// Clones share state via `Arc`. Every successful checkpoint is recorded in
/// order, and a checkpoint that would move progress backwards is rejected
/// with `InvalidState`, as a real lease table would.
#[derive(Debug, Clone)]
pub struct SimulatedCheckpointer {
    /// Successfully persisted checkpoints, in order.
    persisted: Arc<Mutex<Vec<CheckpointCall>>>,
    /// Fault configuration.
    fault_config: Arc<Mutex<CheckpointerFaultConfig>>,
    /// Number of calls attempted, including failed ones.
    attempts: Arc<AtomicU64>,
    /// RNG seed for deterministic faults.
    seed: u64,
    /// Operation counter for deterministic RNG.
    counter: Arc<AtomicU64>,
}

impl SimulatedCheckpointer {
    /// Creates a new simulated checkpointer with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, CheckpointerFaultConfig::none())
    }

    /// Creates a simulated checkpointer with fault injection.
    #[must_use]
    pub fn with_faults(seed: u64, config: CheckpointerFaultConfig) -> Self {
        Self {
            persisted: Arc::new(Mutex::new(Vec::new())),
            fault_config: Arc::new(Mutex::new(config)),
            attempts: Arc::new(AtomicU64::new(0)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes the next call fail with `error` (one-shot, queued in order).
    pub fn fail_next(&self, error: CheckpointError) {
        lock(&self.fault_config).forced.push_back(error);
    }

    /// Sets the probability of random failures.
    pub fn set_fail_rate(&self, rate: f64) {
        lock(&self.fault_config).fail_rate = rate;
    }

    /// Returns all persisted checkpoints, oldest first.
    #[must_use]
    pub fn persisted(&self) -> Vec<CheckpointCall> {
        lock(&self.persisted).clone()
    }

    /// Returns the most recent persisted checkpoint.
    #[must_use]
    pub fn last_persisted(&self) -> Option<CheckpointCall> {
        lock(&self.persisted).last().cloned()
    }

    /// Returns the most recent persisted position, ignoring shard-end markers.
    #[must_use]
    pub fn last_position(&self) -> Option<Position> {
        lock(&self.persisted)
            .iter()
            .rev()
            .find_map(|call| match call {
                CheckpointCall::Position(position) => Some(position.clone()),
                CheckpointCall::ShardEnd => None,
            })
    }

    /// Returns true if the end-of-shard marker was persisted.
    #[must_use]
    pub fn shard_ended(&self) -> bool {
        lock(&self.persisted).contains(&CheckpointCall::ShardEnd)
    }

    /// Returns the number of calls attempted, successful or not.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Deterministic RNG using the `(seed + counter) * M` formula.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    /// Returns the injected failure for this call, if any.
    fn injected_fault(&self) -> Option<CheckpointError> {
        let mut config = lock(&self.fault_config);
        if let Some(error) = config.forced.pop_front() {
            return Some(error);
        }
        let rate = config.fail_rate;
        let error = config.random_error.clone();
        drop(config);
        self.should_inject_fault(rate).then_some(error)
    }
}

#[async_trait]
impl Checkpointer for SimulatedCheckpointer {
    async fn checkpoint(&self, position: &Position) -> CheckpointResult<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.injected_fault() {
            return Err(error);
        }

        let mut persisted = lock(&self.persisted);
        if persisted.contains(&CheckpointCall::ShardEnd) {
            return Err(CheckpointError::InvalidState {
                message: format!("checkpoint at {position} after shard end"),
            });
        }
        let regresses = persisted.iter().any(|call| match call {
            CheckpointCall::Position(previous) => previous > position,
            CheckpointCall::ShardEnd => false,
        });
        if regresses {
            return Err(CheckpointError::InvalidState {
                message: format!("checkpoint at {position} moves progress backwards"),
            });
        }

        persisted.push(CheckpointCall::Position(position.clone()));
        Ok(())
    }

    async fn checkpoint_shard_end(&self) -> CheckpointResult<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.injected_fault() {
            return Err(error);
        }

        lock(&self.persisted).push(CheckpointCall::ShardEnd);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
