//! Error types for Riffle core operations.
//!
//! Following `TigerStyle`: all errors must be handled explicitly.
//! No silent failures, no ignored errors.

use std::fmt;

/// The result type for Riffle core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Riffle core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A delivered sequence number could not be parsed.
    InvalidSequenceNumber {
        /// The raw value as delivered.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A resource limit was exceeded.
    LimitExceeded {
        /// Which limit was exceeded.
        limit: &'static str,
        /// The maximum allowed value.
        max: u64,
        /// The actual value that exceeded the limit.
        actual: u64,
    },

    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSequenceNumber { value, reason } => {
                write!(f, "invalid sequence number '{value}': {reason}")
            }
            Self::LimitExceeded { limit, max, actual } => {
                write!(f, "limit exceeded: {limit} (max={max}, actual={actual})")
            }
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sequence_number_display() {
        let err = Error::InvalidSequenceNumber {
            value: "12a".to_string(),
            reason: "not a decimal number",
        };
        assert_eq!(
            format!("{err}"),
            "invalid sequence number '12a': not a decimal number"
        );
    }

    #[test]
    fn test_limit_exceeded_display() {
        let err = Error::LimitExceeded {
            limit: "queue_capacity",
            max: 1024,
            actual: 2048,
        };
        let msg = format!("{err}");
        assert!(msg.contains("queue_capacity"));
        assert!(msg.contains("1024"));
        assert!(msg.contains("2048"));
    }
}
