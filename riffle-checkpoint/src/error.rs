//! Checkpoint persistence error types.

use thiserror::Error;

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors reported by the delivery framework's checkpoint persistence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    /// Shard ownership was already revoked or shutdown is in progress.
    #[error("shard is shutting down: {message}")]
    Shutdown {
        /// Error message.
        message: String,
    },

    /// The checkpoint store rate-limited the request.
    #[error("checkpoint throttled: {message}")]
    Throttled {
        /// Error message.
        message: String,
    },

    /// A dependency of the checkpoint store is unavailable.
    #[error("checkpoint dependency unavailable: {message}")]
    DependencyUnavailable {
        /// Error message.
        message: String,
    },

    /// The checkpoint store is in a state that cannot accept checkpoints.
    #[error("invalid checkpoint state: {message}")]
    InvalidState {
        /// Error message.
        message: String,
    },

    /// Any other persistence failure.
    #[error("checkpoint failed: {message}")]
    Other {
        /// Error message.
        message: String,
    },
}

/// What the bridge should do about a failed checkpoint attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The attempt no longer matters; ignore it.
    Moot,
    /// Leave pending state alone and retry at the next evaluation.
    Transient,
    /// Progress can no longer be made durable; abort consumption.
    Fatal,
}

impl CheckpointError {
    /// Classifies this failure.
    #[must_use]
    pub const fn disposition(&self) -> FailureDisposition {
        match self {
            Self::Shutdown { .. } => FailureDisposition::Moot,
            Self::Throttled { .. } | Self::DependencyUnavailable { .. } => {
                FailureDisposition::Transient
            }
            Self::InvalidState { .. } | Self::Other { .. } => FailureDisposition::Fatal,
        }
    }

    /// Returns a short, stable name of the failure kind for stats and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Shutdown { .. } => "shutdown",
            Self::Throttled { .. } => "throttled",
            Self::DependencyUnavailable { .. } => "dependency_unavailable",
            Self::InvalidState { .. } => "invalid_state",
            Self::Other { .. } => "other",
        }
    }
}
