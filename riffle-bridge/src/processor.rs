//! The delivery framework's callback contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use riffle_checkpoint::Checkpointer;
use riffle_core::{Position, ShardId, Timestamp};

/// A record as the delivery framework hands it over, before translation.
#[derive(Debug, Clone)]
pub struct DeliveredRecord {
    /// Decimal sequence number string.
    pub sequence_number: String,
    /// Sub-sequence number, set for records de-aggregated from one entry.
    pub sub_sequence_number: Option<u64>,
    /// Partition key the producer used.
    pub partition_key: String,
    /// Payload.
    pub data: Bytes,
    /// Approximate arrival time reported by the stream.
    pub approximate_arrival: Option<Timestamp>,
}

impl DeliveredRecord {
    /// Creates a plain delivered record.
    #[must_use]
    pub fn new(
        sequence_number: impl Into<String>,
        partition_key: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            sequence_number: sequence_number.into(),
            sub_sequence_number: None,
            partition_key: partition_key.into(),
            data,
            approximate_arrival: None,
        }
    }

    /// Builder: set the sub-sequence number.
    #[must_use]
    pub fn with_sub_sequence(mut self, sub_sequence_number: u64) -> Self {
        self.sub_sequence_number = Some(sub_sequence_number);
        self
    }

    /// Builder: set the approximate arrival time.
    #[must_use]
    pub fn with_arrival(mut self, arrival: Timestamp) -> Self {
        self.approximate_arrival = Some(arrival);
        self
    }
}

/// Handed to `initialize`.
#[derive(Debug, Clone)]
pub struct InitializationInput {
    /// Shard this processor now owns.
    pub shard_id: ShardId,
    /// Where consumption resumes, if the shard was checkpointed before.
    pub starting_position: Option<Position>,
}

/// Handed to `process_records`.
#[derive(Clone)]
pub struct ProcessRecordsInput {
    /// Records in delivery order.
    pub records: Vec<DeliveredRecord>,
    /// How far this batch lags the tip of the shard.
    pub millis_behind_latest: Option<u64>,
    /// Persistence capability for this shard.
    pub checkpointer: Arc<dyn Checkpointer>,
}

impl fmt::Debug for ProcessRecordsInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRecordsInput")
            .field("records", &self.records.len())
            .field("millis_behind_latest", &self.millis_behind_latest)
            .finish_non_exhaustive()
    }
}

/// Why a shard is being shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownReason {
    /// The lease was lost; another worker owns the shard now.
    Zombie,
    /// The shard is exhausted and will never be read again.
    Terminate,
    /// Shutdown was requested from outside.
    Requested,
}

impl ShutdownReason {
    /// Returns all reasons.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Zombie, Self::Terminate, Self::Requested]
    }

    /// Returns a short, stable name for stats and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Zombie => "zombie",
            Self::Terminate => "terminate",
            Self::Requested => "requested",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handed to `shutdown`.
#[derive(Clone)]
pub struct ShutdownInput {
    /// Why the shard is shutting down.
    pub reason: ShutdownReason,
    /// Persistence capability for this shard.
    pub checkpointer: Arc<dyn Checkpointer>,
}

impl fmt::Debug for ShutdownInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownInput")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Callbacks the delivery framework invokes for one shard.
///
/// The framework awaits each call before making the next one, so a call
/// that does not return holds back delivery for that shard.
#[async_trait]
pub trait RecordProcessor: Send {
    /// Called once, before any records are delivered.
    async fn initialize(&mut self, input: InitializationInput);

    /// Called for every delivered batch.
    async fn process_records(&mut self, input: ProcessRecordsInput);

    /// Called once when the shard is released.
    async fn shutdown(&mut self, input: ShutdownInput);

    /// Out-of-band shutdown notification.
    async fn shutdown_requested(&mut self, checkpointer: Arc<dyn Checkpointer>) {
        self.shutdown(ShutdownInput {
            reason: ShutdownReason::Requested,
            checkpointer,
        })
        .await;
    }
}

/// Creates one processor per leased shard.
pub trait RecordProcessorFactory: Send + Sync {
    /// Creates a processor for a newly leased shard.
    fn create_processor(&self) -> Box<dyn RecordProcessor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivered_record_builder() {
        let record = DeliveredRecord::new("42", "key", Bytes::from_static(b"v"))
            .with_sub_sequence(3)
            .with_arrival(Timestamp::from_millis(1_000));

        assert_eq!(record.sequence_number, "42");
        assert_eq!(record.sub_sequence_number, Some(3));
        assert_eq!(record.approximate_arrival, Some(Timestamp::from_millis(1_000)));
    }

    #[test]
    fn test_reason_names() {
        let names: Vec<_> = ShutdownReason::all().iter().map(ToString::to_string).collect();
        assert_eq!(names, ["zombie", "terminate", "requested"]);
    }
}
