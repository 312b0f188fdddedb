//! Strongly-typed identifiers for Riffle.
//!
//! Using newtypes prevents accidentally mixing a shard id with an
//! application name, or comparing sequence numbers as plain strings.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum number of decimal digits in a sequence number.
const SEQUENCE_NUMBER_DIGITS_MAX: usize = 129;

// -----------------------------------------------------------------------------
// Shard Id
// -----------------------------------------------------------------------------

/// Identifier of a shard (partition) as assigned by the delivery framework.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId(String);

impl ShardId {
    /// Creates a new shard id.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the shard id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard({})", self.0)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// Sequence Number
// -----------------------------------------------------------------------------

/// Sequence number assigned by the stream to a record within a shard.
///
/// Sequence numbers are unsigned decimal integers that can exceed 128 bits,
/// so they are kept in normalized decimal form (no leading zeros) and
/// compared numerically: a shorter digit string is always smaller.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SequenceNumber(String);

impl SequenceNumber {
    /// Creates a sequence number from an integer value.
    #[must_use]
    pub fn from_u128(value: u128) -> Self {
        Self(value.to_string())
    }

    /// Returns the normalized decimal representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SequenceNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidSequenceNumber {
                value: s.to_string(),
                reason: "empty",
            });
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidSequenceNumber {
                value: s.to_string(),
                reason: "not a decimal number",
            });
        }

        let trimmed = s.trim_start_matches('0');
        let normalized = if trimmed.is_empty() { "0" } else { trimmed };
        if normalized.len() > SEQUENCE_NUMBER_DIGITS_MAX {
            return Err(Error::InvalidSequenceNumber {
                value: s.to_string(),
                reason: "too many digits",
            });
        }

        Ok(Self(normalized.to_string()))
    }
}

impl Ord for SequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq({})", self.0)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// Position
// -----------------------------------------------------------------------------

/// Position of a record within its shard.
///
/// Records de-aggregated from a single stream entry share a sequence number
/// and are told apart by their sub-sequence number. A position without a
/// sub-sequence sorts before every position with one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Primary sequence number.
    pub sequence_number: SequenceNumber,
    /// Sub-sequence number for aggregated records.
    pub sub_sequence_number: Option<u64>,
}

impl Position {
    /// Creates a position for a plain (non-aggregated) record.
    #[must_use]
    pub const fn new(sequence_number: SequenceNumber) -> Self {
        Self {
            sequence_number,
            sub_sequence_number: None,
        }
    }

    /// Creates a position for a record de-aggregated from a stream entry.
    #[must_use]
    pub const fn with_sub_sequence(sequence_number: SequenceNumber, sub_sequence: u64) -> Self {
        Self {
            sequence_number,
            sub_sequence_number: Some(sub_sequence),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_sequence_number {
            Some(sub) => write!(f, "{}/{sub}", self.sequence_number),
            None => write!(f, "{}", self.sequence_number),
        }
    }
}

// -----------------------------------------------------------------------------
// Partition Identity
// -----------------------------------------------------------------------------

/// Composite identity of one consumed partition, used for log and stats correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionIdentity {
    /// Name of the consuming application.
    pub application: String,
    /// Shard being consumed.
    pub shard_id: ShardId,
}

impl PartitionIdentity {
    /// Creates a new partition identity.
    #[must_use]
    pub fn new(application: impl Into<String>, shard_id: ShardId) -> Self {
        Self {
            application: application.into(),
            shard_id,
        }
    }
}

impl fmt::Display for PartitionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.application, self.shard_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> SequenceNumber {
        s.parse().unwrap()
    }

    #[test]
    fn test_sequence_number_numeric_order() {
        assert!(seq("9") < seq("10"));
        assert!(seq("100") > seq("99"));
        assert!(seq("123") < seq("124"));
        assert_eq!(seq("0042"), seq("42"));
        assert_eq!(seq("000"), seq("0"));
    }

    #[test]
    fn test_sequence_number_beyond_u128() {
        let big = "49590338271490256608559692538361571095921575989136588898";
        let bigger = "49590338271490256608559692538361571095921575989136588899";
        assert!(seq(big) < seq(bigger));
        assert!(SequenceNumber::from_u128(u128::MAX) < seq(big));
        assert_eq!(seq(big).to_string(), big);
    }

    #[test]
    fn test_sequence_number_rejects_garbage() {
        assert!(matches!(
            "".parse::<SequenceNumber>(),
            Err(Error::InvalidSequenceNumber { reason: "empty", .. })
        ));
        assert!("12a".parse::<SequenceNumber>().is_err());
        assert!("-1".parse::<SequenceNumber>().is_err());
        assert!("+1".parse::<SequenceNumber>().is_err());
        assert!("1".repeat(130).parse::<SequenceNumber>().is_err());
    }

    #[test]
    fn test_position_order_with_sub_sequence() {
        let plain = Position::new(seq("5"));
        let sub0 = Position::with_sub_sequence(seq("5"), 0);
        let sub1 = Position::with_sub_sequence(seq("5"), 1);
        let next = Position::new(seq("6"));

        assert!(plain < sub0);
        assert!(sub0 < sub1);
        assert!(sub1 < next);
    }

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new(seq("17")).to_string(), "17");
        assert_eq!(Position::with_sub_sequence(seq("17"), 3).to_string(), "17/3");
    }

    #[test]
    fn test_partition_identity_display() {
        let identity = PartitionIdentity::new("orders-app", ShardId::new("shardId-000000000001"));
        assert_eq!(identity.to_string(), "orders-app:shardId-000000000001");
        assert_eq!(
            format!("{:?}", identity.shard_id),
            "shard(shardId-000000000001)"
        );
    }
}
