//! Property definitions and checkers for Riffle simulation tests.
//!
//! Properties are invariants that must hold after every step of a
//! simulation. Each checker returns the first violation it finds.

use riffle_checkpoint::{CheckpointCall, CheckpointTracker};
use riffle_core::{Position, Record};

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a checkpointing property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// A record left the in-flight sequence while it was incomplete.
    EvictedIncomplete {
        /// The incomplete record.
        position: Position,
    },
    /// A completed record was left at the front of the in-flight sequence.
    PrefixNotMaximal {
        /// The completed front record.
        position: Position,
    },
    /// A checkpoint moved progress backwards.
    CheckpointRegressed {
        /// Earlier checkpoint.
        previous: Position,
        /// Later, smaller checkpoint.
        next: Position,
    },
    /// A checkpoint covered a record that had not completed.
    CheckpointPastIncomplete {
        /// The checkpoint.
        checkpoint: Position,
        /// The incomplete record it covered.
        incomplete: Position,
    },
    /// Something was checkpointed after the shard end marker.
    CheckpointAfterShardEnd,
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EvictedIncomplete { position } => {
                write!(f, "record {position} evicted while incomplete")
            }
            Self::PrefixNotMaximal { position } => {
                write!(f, "completed record {position} left at the front")
            }
            Self::CheckpointRegressed { previous, next } => {
                write!(f, "checkpoint regressed from {previous} to {next}")
            }
            Self::CheckpointPastIncomplete {
                checkpoint,
                incomplete,
            } => write!(
                f,
                "checkpoint {checkpoint} covers incomplete record {incomplete}"
            ),
            Self::CheckpointAfterShardEnd => write!(f, "checkpoint after shard end"),
        }
    }
}

// ============================================================================
// Checkers
// ============================================================================

/// Checks that the tracker evicted exactly the maximal completed prefix of
/// `delivered`.
///
/// Only meaningful right after the tracker advanced (`should_checkpoint` or a
/// checkpoint attempt) with no completions in between.
///
/// # Errors
/// Returns the first violation found.
pub fn check_prefix_eviction(
    delivered: &[Record],
    tracker: &CheckpointTracker,
) -> Result<(), PropertyViolation> {
    let evicted = delivered.len() - tracker.in_flight_len();

    if let Some(record) = delivered[..evicted].iter().find(|r| !r.is_processed()) {
        return Err(PropertyViolation::EvictedIncomplete {
            position: record.position().clone(),
        });
    }
    if let Some(front) = delivered.get(evicted) {
        if front.is_processed() {
            return Err(PropertyViolation::PrefixNotMaximal {
                position: front.position().clone(),
            });
        }
    }
    Ok(())
}

/// Checks that persisted checkpoints never move backwards and nothing follows
/// the shard end marker.
///
/// # Errors
/// Returns the first violation found.
pub fn check_checkpoints_monotonic(calls: &[CheckpointCall]) -> Result<(), PropertyViolation> {
    let mut previous: Option<&Position> = None;
    let mut ended = false;

    for call in calls {
        if ended {
            return Err(PropertyViolation::CheckpointAfterShardEnd);
        }
        match call {
            CheckpointCall::Position(next) => {
                if let Some(previous) = previous {
                    if next < previous {
                        return Err(PropertyViolation::CheckpointRegressed {
                            previous: previous.clone(),
                            next: next.clone(),
                        });
                    }
                }
                previous = Some(next);
            }
            CheckpointCall::ShardEnd => ended = true,
        }
    }
    Ok(())
}

/// Checks that no persisted checkpoint covers an incomplete record.
///
/// # Errors
/// Returns the first violation found.
pub fn check_checkpoints_complete(
    calls: &[CheckpointCall],
    delivered: &[Record],
) -> Result<(), PropertyViolation> {
    for call in calls {
        match call {
            CheckpointCall::Position(checkpoint) => {
                if let Some(incomplete) = delivered
                    .iter()
                    .find(|r| r.position() <= checkpoint && !r.is_processed())
                {
                    return Err(PropertyViolation::CheckpointPastIncomplete {
                        checkpoint: checkpoint.clone(),
                        incomplete: incomplete.position().clone(),
                    });
                }
            }
            CheckpointCall::ShardEnd => {
                if let Some(incomplete) = delivered.iter().find(|r| !r.is_processed()) {
                    return Err(PropertyViolation::CheckpointPastIncomplete {
                        checkpoint: incomplete.position().clone(),
                        incomplete: incomplete.position().clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
