// ABOUTME: Pipeline definitions and their construction-time wiring validation.
// ABOUTME: A definition that builds is guaranteed to resolve every stage input at run time.

use nonempty::NonEmpty;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::engine::StageExecutor;
use crate::artifact::TRIGGER_PRODUCER;
use crate::types::{ArtifactName, PipelineName, StageName};

/// A named unit of work with declared inputs and outputs.
#[derive(Clone)]
pub struct StageDef {
    name: StageName,
    inputs: Vec<ArtifactName>,
    outputs: Vec<ArtifactName>,
    executor: Arc<dyn StageExecutor>,
}

impl std::fmt::Debug for StageDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDef")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl StageDef {
    pub fn new(name: StageName, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            executor,
        }
    }

    pub fn input(mut self, name: ArtifactName) -> Self {
        self.inputs.push(name);
        self
    }

    pub fn output(mut self, name: ArtifactName) -> Self {
        self.outputs.push(name);
        self
    }

    pub fn name(&self) -> &StageName {
        &self.name
    }

    pub fn inputs(&self) -> &[ArtifactName] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ArtifactName] {
        &self.outputs
    }

    pub(crate) fn executor(&self) -> &dyn StageExecutor {
        self.executor.as_ref()
    }
}

/// Errors in a pipeline definition. Always detected before any execution starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WiringError {
    #[error("pipeline {0} has no stages")]
    Empty(PipelineName),

    #[error("duplicate stage name: {0}")]
    DuplicateStage(StageName),

    #[error("artifact {artifact} is produced by both {first} and {second}")]
    DuplicateArtifact {
        artifact: ArtifactName,
        first: String,
        second: String,
    },

    #[error("stage {stage} consumes {artifact}, which is only produced later by {producer}")]
    ForwardReference {
        stage: StageName,
        artifact: ArtifactName,
        producer: StageName,
    },

    #[error("stage {stage} consumes {artifact}, which no stage or trigger produces")]
    UnresolvedInput {
        stage: StageName,
        artifact: ArtifactName,
    },
}

/// A validated, ordered sequence of stages.
#[derive(Debug, Clone)]
pub struct PipelineDef {
    name: PipelineName,
    trigger_artifacts: Vec<ArtifactName>,
    stages: NonEmpty<StageDef>,
}

impl PipelineDef {
    pub fn builder(name: PipelineName) -> PipelineBuilder {
        PipelineBuilder {
            name,
            trigger_artifacts: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn name(&self) -> &PipelineName {
        &self.name
    }

    /// Artifacts the triggering event must supply.
    pub fn trigger_artifacts(&self) -> &[ArtifactName] {
        &self.trigger_artifacts
    }

    pub fn stages(&self) -> impl Iterator<Item = &StageDef> {
        self.stages.iter()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage(&self, index: usize) -> Option<&StageDef> {
        self.stages.get(index)
    }

    /// Index of the last stage consuming each artifact. Unconsumed artifacts are absent.
    pub fn last_consumers(&self) -> HashMap<ArtifactName, usize> {
        let mut last = HashMap::new();
        for (index, stage) in self.stages.iter().enumerate() {
            for input in &stage.inputs {
                last.insert(input.clone(), index);
            }
        }
        last
    }
}

/// Builder for [`PipelineDef`]; `build` performs wiring validation.
#[derive(Debug)]
pub struct PipelineBuilder {
    name: PipelineName,
    trigger_artifacts: Vec<ArtifactName>,
    stages: Vec<StageDef>,
}

impl PipelineBuilder {
    /// Declare an artifact supplied by the triggering event.
    pub fn trigger_artifact(mut self, name: ArtifactName) -> Self {
        self.trigger_artifacts.push(name);
        self
    }

    pub fn stage(mut self, stage: StageDef) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Result<PipelineDef, WiringError> {
        let stages =
            NonEmpty::from_vec(self.stages).ok_or_else(|| WiringError::Empty(self.name.clone()))?;

        let mut stage_names = HashSet::new();
        for stage in stages.iter() {
            if !stage_names.insert(stage.name.clone()) {
                return Err(WiringError::DuplicateStage(stage.name.clone()));
            }
        }

        let names: Vec<StageName> = stages.iter().map(|s| s.name.clone()).collect();

        // Producer of every artifact, by stage index (None for the trigger).
        let mut producers: HashMap<ArtifactName, Option<usize>> = HashMap::new();
        let mut claim = |artifact: &ArtifactName, producer: Option<usize>| {
            if let Some(existing) = producers.get(artifact) {
                let label = |p: &Option<usize>| match p {
                    Some(i) => names[*i].to_string(),
                    None => TRIGGER_PRODUCER.to_string(),
                };
                return Err(WiringError::DuplicateArtifact {
                    artifact: artifact.clone(),
                    first: label(existing),
                    second: label(&producer),
                });
            }
            producers.insert(artifact.clone(), producer);
            Ok(())
        };

        for artifact in &self.trigger_artifacts {
            claim(artifact, None)?;
        }
        for (index, stage) in stages.iter().enumerate() {
            for output in &stage.outputs {
                claim(output, Some(index))?;
            }
        }

        for (index, stage) in stages.iter().enumerate() {
            for input in &stage.inputs {
                match producers.get(input) {
                    Some(None) => {}
                    Some(Some(producer)) if *producer < index => {}
                    Some(Some(producer)) => {
                        return Err(WiringError::ForwardReference {
                            stage: stage.name.clone(),
                            artifact: input.clone(),
                            producer: names[*producer].clone(),
                        });
                    }
                    None => {
                        return Err(WiringError::UnresolvedInput {
                            stage: stage.name.clone(),
                            artifact: input.clone(),
                        });
                    }
                }
            }
        }

        Ok(PipelineDef {
            name: self.name,
            trigger_artifacts: self.trigger_artifacts,
            stages,
        })
    }
}
