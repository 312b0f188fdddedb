//! Checkpoint configuration.

use std::time::Duration;

use riffle_core::{Error, Limits, Result};

/// Thresholds controlling when checkpoints are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Checkpoint once this many records completed since the last attempt.
    pub max_batch_size: u32,
    /// Checkpoint once this much time passed since the last attempt.
    pub max_batch_wait: Duration,
    /// How long a requested shutdown waits for in-flight records.
    pub shutdown_wait: Duration,
}

impl CheckpointConfig {
    /// Creates config with production defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_batch_size: 1000,
            max_batch_wait: Duration::from_secs(10),
            shutdown_wait: Duration::from_secs(60),
        }
    }

    /// Creates config for testing with small thresholds.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_batch_size: 5,
            max_batch_wait: Duration::from_secs(60),
            shutdown_wait: Duration::from_secs(1),
        }
    }

    /// Builder: set the record-count threshold.
    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: u32) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Builder: set the time threshold.
    #[must_use]
    pub const fn with_max_batch_wait(mut self, max_batch_wait: Duration) -> Self {
        self.max_batch_wait = max_batch_wait;
        self
    }

    /// Builder: set the requested-shutdown wait.
    #[must_use]
    pub const fn with_shutdown_wait(mut self, shutdown_wait: Duration) -> Self {
        self.shutdown_wait = shutdown_wait;
        self
    }

    /// Validates the config against system limits.
    ///
    /// # Errors
    /// Returns an error if a threshold is zero or exceeds its limit.
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::InvalidArgument {
                name: "max_batch_size",
                reason: "must be positive",
            });
        }
        if self.max_batch_size > limits.max_checkpoint_batch_size {
            return Err(Error::LimitExceeded {
                limit: "max_batch_size",
                max: u64::from(limits.max_checkpoint_batch_size),
                actual: u64::from(self.max_batch_size),
            });
        }

        if self.max_batch_wait.is_zero() {
            return Err(Error::InvalidArgument {
                name: "max_batch_wait",
                reason: "must be positive",
            });
        }
        if self.max_batch_wait > limits.max_checkpoint_interval {
            return Err(Error::LimitExceeded {
                limit: "max_batch_wait_ms",
                max: duration_millis(limits.max_checkpoint_interval),
                actual: duration_millis(self.max_batch_wait),
            });
        }

        if self.shutdown_wait > limits.max_shutdown_wait {
            return Err(Error::LimitExceeded {
                limit: "shutdown_wait_ms",
                max: duration_millis(limits.max_shutdown_wait),
                actual: duration_millis(self.shutdown_wait),
            });
        }

        Ok(())
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_possible_truncation)] // Bounded by limits, far below u64::MAX ms.
const fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
