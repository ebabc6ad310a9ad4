// ABOUTME: Pipeline orchestrator: runs stages in order, wiring artifacts and persisting progress.
// ABOUTME: The single place that decides whether an execution halts.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::cancel::Cancellation;
use super::definition::PipelineDef;
use super::engine::{StageContext, StageEngine};
use super::event::PipelineEvent;
use super::record::{ExecutionRecord, ExecutionStatus};
use super::result::{FailureKind, PipelineResult, StageResult};
use super::trigger::Trigger;
use crate::artifact::{ArtifactError, ArtifactStore, Retention, TRIGGER_PRODUCER};
use crate::diagnostics::{Diagnostics, Warning};
use crate::state::{StateError, StateStore};
use crate::types::{ArtifactName, ExecutionId, StageName};

/// Failures of the pipeline machinery itself, as opposed to a stage failing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to persist execution {id}: {source}")]
    State {
        id: ExecutionId,
        #[source]
        source: StateError,
    },

    #[error("trigger did not supply artifact {0}")]
    MissingTriggerArtifact(ArtifactName),

    #[error("stage {stage} input {artifact} is not held by this execution")]
    MissingInput {
        stage: StageName,
        artifact: ArtifactName,
    },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("execution not found: {0}")]
    NotFound(ExecutionId),

    #[error("execution {id} is already {status}")]
    NotResumable {
        id: ExecutionId,
        status: ExecutionStatus,
    },

    #[error("execution {0} was created by a different pipeline definition")]
    DefinitionMismatch(ExecutionId),
}

/// Runs pipeline executions against shared artifact and state stores.
pub struct Orchestrator {
    artifacts: Arc<dyn ArtifactStore>,
    state: Arc<dyn StateStore>,
    retention: Retention,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
    diagnostics: Arc<Diagnostics>,
}

impl Orchestrator {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, state: Arc<dyn StateStore>) -> Self {
        Self {
            artifacts,
            state,
            retention: Retention::default(),
            events: None,
            diagnostics: Arc::new(Diagnostics::default()),
        }
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Send progress events to `events`. A closed receiver is ignored.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Run one execution of `def` for `trigger`.
    ///
    /// A failing stage yields `Ok(PipelineResult::Failed)`; `Err` means the
    /// pipeline machinery itself broke.
    #[tracing::instrument(skip_all, fields(pipeline = %def.name(), trigger = %trigger.reason))]
    pub async fn execute(
        &self,
        def: &PipelineDef,
        trigger: Trigger,
        cancel: &Cancellation,
    ) -> Result<PipelineResult, PipelineError> {
        if let Some(missing) = def
            .trigger_artifacts()
            .iter()
            .find(|name| !trigger.artifacts.contains_key(*name))
        {
            return Err(PipelineError::MissingTriggerArtifact(missing.clone()));
        }

        let mut record = ExecutionRecord::new(ExecutionId::generate(), def, trigger.info());
        for name in def.trigger_artifacts() {
            if let Some(content) = trigger.artifacts.get(name) {
                let artifact = self
                    .artifacts
                    .put(TRIGGER_PRODUCER, name.clone(), content.clone())?;
                record.artifacts.insert(name.clone(), artifact.id().clone());
            }
        }

        tracing::info!(execution = %record.id, "execution started");
        self.persist(&record).await?;
        self.emit(PipelineEvent::ExecutionStarted {
            execution_id: record.id.clone(),
            pipeline: def.name().clone(),
        });

        self.run_stages(def, &mut record, &trigger, 0, cancel).await
    }

    /// Run independent executions concurrently, one per trigger.
    pub async fn execute_all(
        &self,
        def: &PipelineDef,
        triggers: Vec<Trigger>,
        cancel: &Cancellation,
    ) -> Vec<Result<PipelineResult, PipelineError>> {
        join_all(
            triggers
                .into_iter()
                .map(|trigger| self.execute(def, trigger, cancel)),
        )
        .await
    }

    /// Continue an interrupted (or stuck) execution from its first unfinished stage.
    #[tracing::instrument(skip_all, fields(pipeline = %def.name(), execution = %id))]
    pub async fn resume(
        &self,
        def: &PipelineDef,
        id: &ExecutionId,
        cancel: &Cancellation,
    ) -> Result<PipelineResult, PipelineError> {
        let mut record = self
            .state
            .load_execution(id)
            .await
            .map_err(|source| PipelineError::State {
                id: id.clone(),
                source,
            })?
            .ok_or_else(|| PipelineError::NotFound(id.clone()))?;

        if record.status.is_finished() {
            return Err(PipelineError::NotResumable {
                id: id.clone(),
                status: record.status,
            });
        }
        if !record.matches(def) {
            return Err(PipelineError::DefinitionMismatch(id.clone()));
        }

        let start = record.next_stage().unwrap_or(def.stage_count());
        tracing::info!(start, "resuming execution");
        record.resumed();

        let trigger = Trigger::from(record.trigger.clone());
        self.run_stages(def, &mut record, &trigger, start, cancel)
            .await
    }

    async fn run_stages(
        &self,
        def: &PipelineDef,
        record: &mut ExecutionRecord,
        trigger: &Trigger,
        start: usize,
        cancel: &Cancellation,
    ) -> Result<PipelineResult, PipelineError> {
        let engine = StageEngine::new(self.artifacts.as_ref(), &self.diagnostics);
        let last_consumers = def.last_consumers();
        let execution_id = record.id.clone();

        for (index, stage) in def.stages().enumerate().skip(start) {
            if cancel.is_cancelled() {
                tracing::info!(stage = %stage.name(), "execution cancelled before stage");
                record.cancelled_before(index);
                self.release_all(record);
                self.persist(record).await?;
                self.emit(PipelineEvent::ExecutionFinished {
                    execution_id: execution_id.clone(),
                    status: record.status,
                });
                return Ok(PipelineResult::Failed {
                    execution_id,
                    stage: stage.name().clone(),
                    cause: "execution cancelled before stage started".to_string(),
                    kind: FailureKind::Cancelled,
                });
            }

            let mut inputs = BTreeMap::new();
            for name in stage.inputs() {
                let id = record
                    .artifacts
                    .get(name)
                    .ok_or_else(|| PipelineError::MissingInput {
                        stage: stage.name().clone(),
                        artifact: name.clone(),
                    })?;
                inputs.insert(name.clone(), self.artifacts.get(id)?);
            }

            record.stage_started(index);
            self.persist(record).await?;
            self.emit(PipelineEvent::StageStarted {
                execution_id: execution_id.clone(),
                stage: stage.name().clone(),
            });
            tracing::info!(stage = %stage.name(), "stage started");

            let ctx = StageContext {
                execution_id: &execution_id,
                stage: stage.name(),
                trigger,
                inputs: &inputs,
                cancel,
            };
            let span = tracing::info_span!("stage", name = %stage.name(), index);
            let result = engine.run(stage, &ctx).instrument(span).await;

            match result {
                StageResult::Succeeded(outputs) => {
                    let ids: Vec<_> = outputs.iter().map(|a| a.id().clone()).collect();
                    for artifact in &outputs {
                        record
                            .artifacts
                            .insert(artifact.name().clone(), artifact.id().clone());
                    }
                    record.stage_succeeded(index, ids.clone());
                    self.release_consumed(record, &last_consumers, index);
                    self.persist(record).await?;

                    tracing::info!(stage = %stage.name(), outputs = ids.len(), "stage succeeded");
                    self.emit(PipelineEvent::StageSucceeded {
                        execution_id: execution_id.clone(),
                        stage: stage.name().clone(),
                        outputs: ids,
                    });
                }
                StageResult::Failed(failure) => {
                    record.stage_failed(index, &failure.cause, failure.kind);
                    if record.status.is_finished() {
                        self.release_all(record);
                    }
                    self.persist(record).await?;

                    tracing::warn!(
                        stage = %stage.name(),
                        kind = %failure.kind,
                        cause = %failure.cause,
                        "stage failed, halting execution"
                    );
                    self.emit(PipelineEvent::StageFailed {
                        execution_id: execution_id.clone(),
                        stage: stage.name().clone(),
                        kind: failure.kind,
                        cause: failure.cause.clone(),
                    });
                    self.emit(PipelineEvent::ExecutionFinished {
                        execution_id: execution_id.clone(),
                        status: record.status,
                    });

                    return Ok(PipelineResult::Failed {
                        execution_id,
                        stage: stage.name().clone(),
                        cause: failure.cause,
                        kind: failure.kind,
                    });
                }
            }
        }

        record.succeeded();
        self.persist(record).await?;

        let mut artifacts = record
            .artifacts
            .values()
            .map(|id| self.artifacts.get(id))
            .collect::<Result<Vec<_>, _>>()?;
        artifacts.sort_by_key(|a| a.created_at());

        tracing::info!(execution = %execution_id, "execution succeeded");
        self.emit(PipelineEvent::ExecutionFinished {
            execution_id: execution_id.clone(),
            status: record.status,
        });

        Ok(PipelineResult::Succeeded {
            execution_id,
            artifacts,
        })
    }

    /// Release artifacts whose last consumer is at or before `index`. Terminal outputs stay.
    fn release_consumed(
        &self,
        record: &mut ExecutionRecord,
        last_consumers: &HashMap<ArtifactName, usize>,
        index: usize,
    ) {
        if self.retention == Retention::KeepAll {
            return;
        }
        let consumed: Vec<ArtifactName> = record
            .artifacts
            .keys()
            .filter(|name| last_consumers.get(*name).is_some_and(|last| *last <= index))
            .cloned()
            .collect();
        for name in consumed {
            self.release(record, &name);
        }
    }

    /// Release everything a failed or cancelled execution still holds.
    fn release_all(&self, record: &mut ExecutionRecord) {
        if self.retention == Retention::KeepAll {
            return;
        }
        let held: Vec<ArtifactName> = record.artifacts.keys().cloned().collect();
        for name in held {
            self.release(record, &name);
        }
    }

    fn release(&self, record: &mut ExecutionRecord, name: &ArtifactName) {
        let Some(id) = record.artifacts.remove(name) else {
            return;
        };
        match self.artifacts.release(&id) {
            Ok(()) => tracing::debug!(artifact = %name, id = %id, "artifact released"),
            Err(e) => self.diagnostics.warn(Warning::artifact_release(format!(
                "failed to release artifact {} ({}): {}",
                name, id, e
            ))),
        }
    }

    async fn persist(&self, record: &ExecutionRecord) -> Result<(), PipelineError> {
        self.state
            .save_execution(record)
            .await
            .map_err(|source| PipelineError::State {
                id: record.id.clone(),
                source,
            })
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
