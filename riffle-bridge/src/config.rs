//! Bridge configuration.

use riffle_checkpoint::CheckpointConfig;
use riffle_core::{Error, Limits, Result};
use riffle_flow::QueueConfig;

/// Configuration shared by every bridge of one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Application name, first half of every partition identity.
    pub application_name: String,
    /// Checkpoint thresholds.
    pub checkpoint: CheckpointConfig,
    /// Downstream queue settings.
    pub queue: QueueConfig,
}

impl BridgeConfig {
    /// Creates config with production defaults.
    #[must_use]
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            checkpoint: CheckpointConfig::new(),
            queue: QueueConfig::new(),
        }
    }

    /// Creates config for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            application_name: "test-app".to_string(),
            checkpoint: CheckpointConfig::for_testing(),
            queue: QueueConfig::for_testing(),
        }
    }

    /// Builder: set checkpoint thresholds.
    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: CheckpointConfig) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Builder: set queue settings.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Validates the config against system limits.
    ///
    /// # Errors
    /// Returns an error if the application name is empty or a nested config
    /// is invalid.
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        if self.application_name.is_empty() {
            return Err(Error::InvalidArgument {
                name: "application_name",
                reason: "must not be empty",
            });
        }
        self.checkpoint.validate(limits)?;
        self.queue.validate(limits)
    }
}
