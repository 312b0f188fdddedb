//! System limits and configuration bounds.
//!
//! Following TigerStyle: put limits on everything.
//! Every queue, threshold and wait has an explicit maximum so that a
//! misconfigured consumer fails at startup instead of hanging at runtime.

use std::time::Duration;

/// Upper bounds for Riffle configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Delivery limits.
    /// Maximum number of records the framework may deliver in one batch.
    pub max_records_per_batch: u32,

    // Queue limits.
    /// Maximum capacity of the downstream queue, in batches.
    pub max_queue_capacity: u32,

    // Checkpoint limits.
    /// Maximum record-count threshold between checkpoints.
    pub max_checkpoint_batch_size: u32,
    /// Maximum time threshold between checkpoints.
    pub max_checkpoint_interval: Duration,
    /// Maximum bounded wait for in-flight records on requested shutdown.
    pub max_shutdown_wait: Duration,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // The stream never returns more than 10k records per fetch.
            max_records_per_batch: 10_000,

            // Queue: 64k batches.
            max_queue_capacity: 64 * 1024,

            // Checkpoints: 1M records, 1 hour, 10 minute drain.
            max_checkpoint_batch_size: 1_000_000,
            max_checkpoint_interval: Duration::from_secs(60 * 60),
            max_shutdown_wait: Duration::from_secs(10 * 60),
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_records_per_batch == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_records_per_batch",
                reason: "must be positive",
            });
        }

        if self.max_queue_capacity == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_queue_capacity",
                reason: "must be positive",
            });
        }

        if self.max_checkpoint_batch_size == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_checkpoint_batch_size",
                reason: "must be positive",
            });
        }

        if self.max_checkpoint_interval.is_zero() {
            return Err(crate::Error::InvalidArgument {
                name: "max_checkpoint_interval",
                reason: "must be positive",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
