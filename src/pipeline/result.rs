// ABOUTME: Outcome of a stage or of a whole pipeline execution.
// ABOUTME: Separates unhealthy releases from broken pipelines via `FailureKind`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::Artifact;
use crate::types::{ExecutionId, StageName};

/// Why a stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage's executor failed; the pipeline itself is at fault.
    StageExecution,
    /// The release was unhealthy and has been rolled back.
    DeploymentRolledBack,
    /// The old task set could not be terminated; an operator must intervene.
    DeploymentStuck,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::StageExecution => "stage execution failed",
            FailureKind::DeploymentRolledBack => "deployment rolled back",
            FailureKind::DeploymentStuck => "deployment stuck",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A stage's failure, with a human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {cause}")]
pub struct StageFailure {
    pub kind: FailureKind,
    pub cause: String,
}

impl StageFailure {
    pub fn execution(cause: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::StageExecution,
            cause: cause.into(),
        }
    }

    pub fn rolled_back(cause: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::DeploymentRolledBack,
            cause: cause.into(),
        }
    }

    pub fn stuck(cause: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::DeploymentStuck,
            cause: cause.into(),
        }
    }

    pub fn cancelled(cause: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            cause: cause.into(),
        }
    }
}

/// Outcome of one stage run.
#[derive(Debug, Clone)]
pub enum StageResult {
    Succeeded(Vec<Artifact>),
    Failed(StageFailure),
}

/// Outcome of a pipeline execution.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    /// Every stage succeeded. `artifacts` are those the execution still holds, oldest first.
    Succeeded {
        execution_id: ExecutionId,
        artifacts: Vec<Artifact>,
    },
    /// Stage `stage` failed and no later stage ran.
    Failed {
        execution_id: ExecutionId,
        stage: StageName,
        cause: String,
        kind: FailureKind,
    },
}

impl PipelineResult {
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            PipelineResult::Succeeded { execution_id, .. }
            | PipelineResult::Failed { execution_id, .. } => execution_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Succeeded { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            PipelineResult::Succeeded { .. } => None,
            PipelineResult::Failed { kind, .. } => Some(*kind),
        }
    }
}
