// ABOUTME: Stage executor capability and the engine that runs one stage.
// ABOUTME: The engine enforces declared outputs and records them; it never retries.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::cancel::Cancellation;
use super::definition::StageDef;
use super::result::{StageFailure, StageResult};
use super::trigger::Trigger;
use crate::artifact::{Artifact, ArtifactContent, ArtifactStore};
use crate::diagnostics::{Diagnostics, Warning};
use crate::types::{ArtifactName, ExecutionId, StageName};

/// Outputs a stage returns, keyed by declared artifact name.
pub type StageOutputs = BTreeMap<ArtifactName, ArtifactContent>;

/// Everything a stage may read while it runs.
#[derive(Debug)]
pub struct StageContext<'a> {
    pub execution_id: &'a ExecutionId,
    pub stage: &'a StageName,
    pub trigger: &'a Trigger,
    pub inputs: &'a BTreeMap<ArtifactName, Artifact>,
    /// Long-running stages should watch this; the pipeline only checks it between stages.
    pub cancel: &'a Cancellation,
}

impl StageContext<'_> {
    /// A declared input. Wiring validation guarantees presence for declared names.
    pub fn input(&self, name: &ArtifactName) -> Result<&Artifact, StageFailure> {
        self.inputs.get(name).ok_or_else(|| {
            StageFailure::execution(format!("input artifact {} was not provided", name))
        })
    }
}

/// The external work behind a stage.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutputs, StageFailure>;
}

/// Runs single stages against an artifact store.
pub struct StageEngine<'a> {
    store: &'a dyn ArtifactStore,
    diagnostics: &'a Diagnostics,
}

impl<'a> StageEngine<'a> {
    pub fn new(store: &'a dyn ArtifactStore, diagnostics: &'a Diagnostics) -> Self {
        Self { store, diagnostics }
    }

    /// Run `stage` and store its outputs.
    ///
    /// A stage that omits a declared output, or returns one it never declared,
    /// fails; nothing it returned is stored in that case.
    pub async fn run(&self, stage: &StageDef, ctx: &StageContext<'_>) -> StageResult {
        let outputs = match stage.executor().execute(ctx).await {
            Ok(outputs) => outputs,
            Err(failure) => return StageResult::Failed(failure),
        };

        if let Some(extra) = outputs.keys().find(|name| !stage.outputs().contains(name)) {
            return StageResult::Failed(StageFailure::execution(format!(
                "stage produced undeclared artifact {}",
                extra
            )));
        }
        if let Some(missing) = stage
            .outputs()
            .iter()
            .find(|name| !outputs.contains_key(*name))
        {
            return StageResult::Failed(StageFailure::execution(format!(
                "stage did not produce declared artifact {}",
                missing
            )));
        }

        let mut produced = Vec::with_capacity(outputs.len());
        for (name, content) in outputs {
            match self.store.put(stage.name().as_str(), name, content) {
                Ok(artifact) => produced.push(artifact),
                Err(e) => {
                    // Outputs are all-or-nothing.
                    for artifact in &produced {
                        if let Err(release) = self.store.release(artifact.id()) {
                            self.diagnostics.warn(Warning::artifact_release(format!(
                                "failed to release partial output {} ({}): {}",
                                artifact.name(),
                                artifact.id(),
                                release
                            )));
                        }
                    }
                    return StageResult::Failed(StageFailure::execution(format!(
                        "failed to store output: {}",
                        e
                    )));
                }
            }
        }

        StageResult::Succeeded(produced)
    }
}
