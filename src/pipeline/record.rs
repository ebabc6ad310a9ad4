// ABOUTME: Persisted progress of one pipeline execution.
// ABOUTME: Updated after every stage transition so an interrupted execution can resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::definition::PipelineDef;
use super::result::FailureKind;
use super::trigger::TriggerInfo;
use crate::types::{ArtifactId, ArtifactName, ExecutionId, PipelineName, StageName};

/// Lifecycle of a stage within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never started because an earlier stage failed or the execution was cancelled.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Deployment could not terminate the old task set; resuming retries it.
    Stuck,
}

impl ExecutionStatus {
    /// Finished executions cannot be resumed.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Stuck => "stuck",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: StageName,
    pub status: StageStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub outputs: Vec<ArtifactId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub stage: StageName,
    pub cause: String,
    pub kind: FailureKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub pipeline: PipelineName,
    pub trigger: TriggerInfo,
    pub status: ExecutionStatus,
    /// Index of the stage currently or last running.
    pub cursor: usize,
    pub stages: Vec<StageRecord>,
    /// Every artifact this execution holds, by name.
    #[serde(default)]
    pub artifacts: BTreeMap<ArtifactName, ArtifactId>,
    #[serde(default)]
    pub failure: Option<FailureRecord>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    pub fn new(id: ExecutionId, def: &PipelineDef, trigger: TriggerInfo) -> Self {
        Self {
            id,
            pipeline: def.name().clone(),
            trigger,
            status: ExecutionStatus::Running,
            cursor: 0,
            stages: def
                .stages()
                .map(|stage| StageRecord {
                    name: stage.name().clone(),
                    status: StageStatus::Pending,
                    started_at: None,
                    finished_at: None,
                    cause: None,
                    outputs: Vec::new(),
                })
                .collect(),
            artifacts: BTreeMap::new(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Whether `def` has the same name and stage sequence this record was created from.
    pub fn matches(&self, def: &PipelineDef) -> bool {
        &self.pipeline == def.name()
            && self.stages.len() == def.stage_count()
            && self
                .stages
                .iter()
                .zip(def.stages())
                .all(|(record, stage)| &record.name == stage.name())
    }

    /// First stage that has not succeeded yet.
    pub fn next_stage(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status != StageStatus::Succeeded)
    }

    pub(crate) fn stage_started(&mut self, index: usize) {
        self.cursor = index;
        if let Some(stage) = self.stages.get_mut(index) {
            stage.status = StageStatus::Running;
            stage.started_at = Some(Utc::now());
            stage.finished_at = None;
            stage.cause = None;
        }
    }

    pub(crate) fn stage_succeeded(&mut self, index: usize, outputs: Vec<ArtifactId>) {
        if let Some(stage) = self.stages.get_mut(index) {
            stage.status = StageStatus::Succeeded;
            stage.finished_at = Some(Utc::now());
            stage.outputs = outputs;
        }
    }

    pub(crate) fn stage_failed(&mut self, index: usize, cause: &str, kind: FailureKind) {
        let now = Utc::now();
        if let Some(stage) = self.stages.get_mut(index) {
            stage.status = StageStatus::Failed;
            stage.finished_at = Some(now);
            stage.cause = Some(cause.to_string());
            self.failure = Some(FailureRecord {
                stage: stage.name.clone(),
                cause: cause.to_string(),
                kind,
            });
        }
        self.status = match kind {
            FailureKind::Cancelled => ExecutionStatus::Cancelled,
            FailureKind::DeploymentStuck => ExecutionStatus::Stuck,
            FailureKind::StageExecution | FailureKind::DeploymentRolledBack => {
                ExecutionStatus::Failed
            }
        };
        if self.status.is_finished() {
            self.skip_from(index + 1);
            self.finished_at = Some(now);
        }
    }

    /// Cancelled between stages: stage `index` never started.
    pub(crate) fn cancelled_before(&mut self, index: usize) {
        self.cursor = index;
        if let Some(stage) = self.stages.get(index) {
            self.failure = Some(FailureRecord {
                stage: stage.name.clone(),
                cause: "execution cancelled before stage started".to_string(),
                kind: FailureKind::Cancelled,
            });
        }
        self.skip_from(index);
        self.status = ExecutionStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn resumed(&mut self) {
        self.status = ExecutionStatus::Running;
        self.failure = None;
    }

    pub(crate) fn succeeded(&mut self) {
        self.status = ExecutionStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    fn skip_from(&mut self, index: usize) {
        for stage in self.stages.iter_mut().skip(index) {
            if stage.status == StageStatus::Pending {
                stage.status = StageStatus::Skipped;
            }
        }
    }
}
