// ABOUTME: Error types for blue/green deployment operations.
// ABOUTME: Rollbacks are outcomes, not errors; these cover what the controller itself cannot handle.

use chrono::{DateTime, Utc};

use super::state::InvalidTransition;
use crate::ops::TaskSetError;
use crate::state::StateError;
use crate::types::{DeploymentId, TaskSetId};

/// Errors that stop the controller from driving a deployment forward.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to discover primary task set: {0}")]
    Discovery(#[source] TaskSetError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// Old task set could not be destroyed; the deployment stays in finalizing.
    #[error(
        "deployment {deployment} stuck: old task set {task_set} not terminated after {attempts} attempts: {reason}"
    )]
    TerminationDelivery {
        deployment: DeploymentId,
        task_set: TaskSetId,
        attempts: u32,
        reason: String,
    },

    #[error("deploy lock on {target} held by {holder} (pid {pid}) since {started_at}")]
    LockHeld {
        target: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock error: {0}")]
    Lock(String),

    #[error("failed to persist deployment: {0}")]
    State(#[from] StateError),

    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    #[error("deployment {id} already {state}")]
    AlreadyFinished { id: DeploymentId, state: &'static str },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// Target could not be inspected before the deployment started.
    Discovery,
    /// Controller bug or corrupted record.
    InvalidTransition,
    RollbackFailed,
    /// Needs operator intervention.
    Stuck,
    /// Another execution holds the target.
    LockHeld,
    Lock,
    State,
    NotFound,
    AlreadyFinished,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Discovery(_) => DeployErrorKind::Discovery,
            DeployError::InvalidTransition(_) => DeployErrorKind::InvalidTransition,
            DeployError::RollbackFailed(_) => DeployErrorKind::RollbackFailed,
            DeployError::TerminationDelivery { .. } => DeployErrorKind::Stuck,
            DeployError::LockHeld { .. } => DeployErrorKind::LockHeld,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::State(_) => DeployErrorKind::State,
            DeployError::NotFound(_) => DeployErrorKind::NotFound,
            DeployError::AlreadyFinished { .. } => DeployErrorKind::AlreadyFinished,
        }
    }

    pub(crate) fn lock_error(message: impl Into<String>) -> Self {
        DeployError::Lock(message.into())
    }

    pub fn is_stuck(&self) -> bool {
        self.kind() == DeployErrorKind::Stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_delivery_is_stuck() {
        let err = DeployError::TerminationDelivery {
            deployment: DeploymentId::new("d-1"),
            task_set: TaskSetId::new("blue"),
            attempts: 4,
            reason: "target unreachable".to_string(),
        };
        assert!(err.is_stuck());
        let message = err.to_string();
        assert!(message.contains("d-1"));
        assert!(message.contains("4 attempts"));
    }

    #[test]
    fn lock_held_reports_holder() {
        let err = DeployError::LockHeld {
            target: "prod".to_string(),
            holder: "ci-runner".to_string(),
            pid: 42,
            started_at: Utc::now(),
        };
        assert_eq!(err.kind(), DeployErrorKind::LockHeld);
        assert!(err.to_string().contains("ci-runner"));
    }
}
