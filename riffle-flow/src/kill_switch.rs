//! Pipeline-wide kill switch.
//!
//! A `KillSwitch` moves the pipeline out of `Running` exactly once: either
//! gracefully (`shutdown`) or with a failure cause (`abort`). The first
//! transition wins. `Termination` is the read side, handed to anything that
//! must stop waiting once the pipeline is over.

use std::fmt;
use std::future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

/// Lifecycle of the downstream pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Still consuming.
    Running,
    /// Shut down gracefully.
    Completed,
    /// Aborted.
    Failed {
        /// Why the pipeline was aborted.
        cause: String,
    },
}

impl PipelineStatus {
    /// Returns true once the pipeline left `Running`.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed { cause } => write!(f, "failed: {cause}"),
        }
    }
}

// -----------------------------------------------------------------------------
// KillSwitch
// -----------------------------------------------------------------------------

/// Write side of the pipeline status. Clones control the same pipeline.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    status: Arc<watch::Sender<PipelineStatus>>,
}

impl KillSwitch {
    /// Creates a kill switch for a running pipeline.
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(PipelineStatus::Running);
        Self {
            status: Arc::new(status),
        }
    }

    /// Fails the whole pipeline.
    ///
    /// Returns false if the pipeline had already terminated.
    pub fn abort(&self, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        let fired = self.transition(PipelineStatus::Failed {
            cause: cause.clone(),
        });
        if fired {
            error!(cause = %cause, "Pipeline aborted");
        }
        fired
    }

    /// Completes the pipeline gracefully.
    ///
    /// Returns false if the pipeline had already terminated.
    pub fn shutdown(&self) -> bool {
        let fired = self.transition(PipelineStatus::Completed);
        if fired {
            info!("Pipeline shut down");
        }
        fired
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    /// Returns true if the pipeline was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(*self.status.borrow(), PipelineStatus::Failed { .. })
    }

    /// Returns an observer of the pipeline status.
    #[must_use]
    pub fn termination(&self) -> Termination {
        Termination {
            status: self.status.subscribe(),
        }
    }

    fn transition(&self, next: PipelineStatus) -> bool {
        // TigerStyle: Assert precondition.
        assert!(next.is_terminated(), "cannot transition back to running");

        self.status.send_if_modified(|current| {
            if current.is_terminated() {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Termination
// -----------------------------------------------------------------------------

/// Read side of the pipeline status.
#[derive(Debug, Clone)]
pub struct Termination {
    status: watch::Receiver<PipelineStatus>,
}

impl Termination {
    /// Returns true if the pipeline was aborted.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        matches!(*self.status.borrow(), PipelineStatus::Failed { .. })
    }

    /// Returns true once the pipeline left `Running`.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.status.borrow().is_terminated()
    }

    /// Returns the abort cause, if the pipeline was aborted.
    #[must_use]
    pub fn cause(&self) -> Option<String> {
        match &*self.status.borrow() {
            PipelineStatus::Failed { cause } => Some(cause.clone()),
            PipelineStatus::Running | PipelineStatus::Completed => None,
        }
    }

    /// Waits until the pipeline terminates and returns the final status.
    ///
    /// If every kill switch is dropped while the pipeline is still running,
    /// it can never terminate and this never resolves.
    pub async fn terminated(&self) -> PipelineStatus {
        let mut status = self.status.clone();
        loop {
            let current = status.borrow_and_update().clone();
            if current.is_terminated() {
                return current;
            }
            if status.changed().await.is_err() {
                return future::pending().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_transition_wins() {
        let kill_switch = KillSwitch::new();
        assert_eq!(kill_switch.status(), PipelineStatus::Running);

        assert!(kill_switch.abort("boom"));
        assert!(!kill_switch.shutdown());
        assert!(!kill_switch.abort("again"));

        assert!(kill_switch.is_aborted());
        assert_eq!(
            kill_switch.status(),
            PipelineStatus::Failed {
                cause: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_graceful_shutdown_is_not_failure() {
        let kill_switch = KillSwitch::new();
        let termination = kill_switch.termination();

        assert!(kill_switch.shutdown());
        assert!(termination.is_terminated());
        assert!(!termination.has_failed());
        assert_eq!(termination.cause(), None);
        assert!(!kill_switch.abort("too late"));
    }

    #[test]
    fn test_clones_share_status() {
        let kill_switch = KillSwitch::new();
        let other = kill_switch.clone();
        let termination = kill_switch.termination();

        other.abort("downstream failed");
        assert!(kill_switch.is_aborted());
        assert!(termination.has_failed());
        assert_eq!(termination.cause().as_deref(), Some("downstream failed"));
    }

    #[tokio::test]
    async fn test_terminated_resolves_on_abort() {
        let kill_switch = KillSwitch::new();
        let termination = kill_switch.termination();

        let aborter = kill_switch.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            aborter.abort("late failure");
        });

        let status = tokio::time::timeout(Duration::from_secs(5), termination.terminated())
            .await
            .unwrap();
        assert_eq!(
            status,
            PipelineStatus::Failed {
                cause: "late failure".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_terminated_resolves_immediately_when_already_done() {
        let kill_switch = KillSwitch::new();
        kill_switch.shutdown();

        let status = kill_switch.termination().terminated().await;
        assert_eq!(status, PipelineStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_pending_after_switch_dropped() {
        let kill_switch = KillSwitch::new();
        let termination = kill_switch.termination();
        drop(kill_switch);

        let result = tokio::time::timeout(Duration::from_secs(60), termination.terminated()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PipelineStatus::Running.to_string(), "running");
        assert_eq!(
            PipelineStatus::Failed {
                cause: "x".to_string()
            }
            .to_string(),
            "failed: x"
        );
    }
}
