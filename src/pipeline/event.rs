// ABOUTME: Progress events emitted by the orchestrator.
// ABOUTME: Serializable so the CLI can stream them as JSON lines.

use serde::Serialize;

use super::record::ExecutionStatus;
use super::result::FailureKind;
use crate::types::{ArtifactId, ExecutionId, PipelineName, StageName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        pipeline: PipelineName,
    },
    StageStarted {
        execution_id: ExecutionId,
        stage: StageName,
    },
    StageSucceeded {
        execution_id: ExecutionId,
        stage: StageName,
        outputs: Vec<ArtifactId>,
    },
    StageFailed {
        execution_id: ExecutionId,
        stage: StageName,
        kind: FailureKind,
        cause: String,
    },
    ExecutionFinished {
        execution_id: ExecutionId,
        status: ExecutionStatus,
    },
}

impl PipelineEvent {
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            PipelineEvent::ExecutionStarted { execution_id, .. }
            | PipelineEvent::StageStarted { execution_id, .. }
            | PipelineEvent::StageSucceeded { execution_id, .. }
            | PipelineEvent::StageFailed { execution_id, .. }
            | PipelineEvent::ExecutionFinished { execution_id, .. } => execution_id,
        }
    }
}
