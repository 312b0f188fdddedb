//! Bridge error types.

use riffle_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failures that abort the pipeline.
///
/// None of these reach the delivery framework: the bridge logs them and
/// trips the kill switch.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A delivered record could not be translated.
    #[error("failed to translate record: {0}")]
    Translation(#[from] riffle_core::Error),

    /// A delivered batch exceeded a system limit.
    #[error("batch rejected: {0}")]
    BatchRejected(riffle_core::Error),

    /// The queue discarded a batch instead of applying backpressure.
    #[error("queue dropped a batch of {records} records; it must be configured to backpressure")]
    QueueDropped {
        /// Size of the dropped batch.
        records: usize,
    },

    /// The queue rejected a batch.
    #[error("queue rejected batch: {cause}")]
    QueueFailed {
        /// Cause reported by the queue.
        cause: String,
    },

    /// Checkpoint persistence failed in a way that cannot be retried.
    #[error("fatal checkpoint failure: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A callback panicked.
    #[error("callback panicked: {message}")]
    Panic {
        /// Panic payload, if it was a string.
        message: String,
    },
}
