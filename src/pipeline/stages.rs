// ABOUTME: The standard release stages: source checkout, image build, blue/green deploy.
// ABOUTME: `release_pipeline` wires them into the canonical Source -> Build -> Deploy definition.

use async_trait::async_trait;
use std::sync::Arc;

use super::definition::{PipelineDef, StageDef, WiringError};
use super::engine::{StageContext, StageExecutor, StageOutputs};
use super::result::StageFailure;
use crate::artifact::ArtifactContent;
use crate::config::ReleaseSettings;
use crate::deploy::{BlueGreenController, DeployRequest, DeployState, RollbackCause};
use crate::ops::{BuildError, BuildOps, Collaborators, ExecutionTarget, SourceArtifact, SourceOps};
use crate::types::{ArtifactName, StageName};

pub const SOURCE_STAGE: &str = "source";
pub const BUILD_STAGE: &str = "build";
pub const DEPLOY_STAGE: &str = "deploy";

pub const SOURCE_ARTIFACT: &str = "source";
pub const IMAGE_ARTIFACT: &str = "image";
pub const RELEASE_ARTIFACT: &str = "release";

fn artifact(name: &'static str) -> ArtifactName {
    ArtifactName::from_static(name)
}

fn stage(name: &'static str) -> StageName {
    StageName::from_static(name)
}

/// Checks out the configured branch (or the trigger's revision).
pub struct SourceStage {
    source: Arc<dyn SourceOps>,
    repo: String,
    branch: String,
}

impl SourceStage {
    pub fn new(source: Arc<dyn SourceOps>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            source,
            repo: repo.into(),
            branch: branch.into(),
        }
    }
}

#[async_trait]
impl StageExecutor for SourceStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutputs, StageFailure> {
        let checkout = self
            .source
            .checkout(&self.repo, &self.branch, ctx.trigger.revision.as_deref())
            .await
            .map_err(|e| StageFailure::execution(e.to_string()))?;

        tracing::info!(commit = %checkout.commit_id, "source checked out");

        let mut outputs = StageOutputs::new();
        outputs.insert(
            artifact(SOURCE_ARTIFACT),
            ArtifactContent::Source {
                commit_id: checkout.commit_id,
                content_ref: checkout.content_ref,
            },
        );
        Ok(outputs)
    }
}

/// Turns the source artifact into a container image.
pub struct BuildStage {
    build: Arc<dyn BuildOps>,
}

impl BuildStage {
    pub fn new(build: Arc<dyn BuildOps>) -> Self {
        Self { build }
    }
}

#[async_trait]
impl StageExecutor for BuildStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutputs, StageFailure> {
        let input = ctx.input(&artifact(SOURCE_ARTIFACT))?;
        let (commit_id, content_ref) = input.content().as_source().ok_or_else(|| {
            StageFailure::execution(format!("artifact {} is not a source bundle", input.id()))
        })?;
        let source = SourceArtifact {
            commit_id: commit_id.to_string(),
            content_ref: content_ref.to_string(),
        };

        let image = self.build.build(&source).await.map_err(|e| match e {
            BuildError::Failed { log } => StageFailure::execution(format!("build failed:\n{}", log)),
            other => StageFailure::execution(other.to_string()),
        })?;

        tracing::info!(%image, "image built");

        let mut outputs = StageOutputs::new();
        outputs.insert(artifact(IMAGE_ARTIFACT), ArtifactContent::Image { image });
        Ok(outputs)
    }
}

/// Releases the built image with the blue/green controller.
///
/// Re-running the stage for the same execution resumes its deployment instead of starting another.
pub struct DeployStage {
    controller: Arc<BlueGreenController>,
    target: ExecutionTarget,
}

impl DeployStage {
    pub fn new(controller: Arc<BlueGreenController>, target: ExecutionTarget) -> Self {
        Self { controller, target }
    }
}

#[async_trait]
impl StageExecutor for DeployStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutputs, StageFailure> {
        let input = ctx.input(&artifact(IMAGE_ARTIFACT))?;
        let image = input.content().as_image().cloned().ok_or_else(|| {
            StageFailure::execution(format!("artifact {} is not an image reference", input.id()))
        })?;

        let existing = self
            .controller
            .find_for_execution(ctx.execution_id)
            .await
            .map_err(|e| StageFailure::execution(e.to_string()))?;

        let outcome = match existing {
            Some(deployment) if deployment.state.is_terminal() => Ok(deployment),
            Some(deployment) => self.controller.resume(&deployment.id, ctx.cancel).await,
            None => {
                let request = DeployRequest {
                    execution_id: Some(ctx.execution_id.clone()),
                    target: self.target.clone(),
                    image,
                };
                self.controller.deploy(request, ctx.cancel).await
            }
        };

        let deployment = outcome.map_err(|e| {
            if e.is_stuck() {
                StageFailure::stuck(e.to_string())
            } else {
                StageFailure::execution(e.to_string())
            }
        })?;

        match &deployment.state {
            DeployState::Terminated => {
                let mut outputs = StageOutputs::new();
                outputs.insert(
                    artifact(RELEASE_ARTIFACT),
                    ArtifactContent::Opaque {
                        uri: format!("deployment/{}", deployment.id),
                    },
                );
                Ok(outputs)
            }
            DeployState::RolledBack {
                cause: RollbackCause::Cancelled,
            } => Err(StageFailure::cancelled(format!(
                "deployment {} rolled back after cancellation",
                deployment.id
            ))),
            DeployState::RolledBack { cause } => Err(StageFailure::rolled_back(format!(
                "deployment {} rolled back: {}",
                deployment.id, cause
            ))),
            other => Err(StageFailure::execution(format!(
                "deployment {} stopped in state {}",
                deployment.id, other
            ))),
        }
    }
}

/// The canonical Source -> Build -> Deploy pipeline.
pub fn release_pipeline(
    settings: &ReleaseSettings,
    collaborators: &Collaborators,
    controller: Arc<BlueGreenController>,
) -> Result<PipelineDef, WiringError> {
    let source = SourceStage::new(
        collaborators.source.clone(),
        settings.source.repo.clone(),
        settings.source.branch.clone(),
    );
    let build = BuildStage::new(collaborators.build.clone());
    let deploy = DeployStage::new(controller, settings.target.clone());

    PipelineDef::builder(settings.pipeline.clone())
        .stage(StageDef::new(stage(SOURCE_STAGE), Arc::new(source)).output(artifact(SOURCE_ARTIFACT)))
        .stage(
            StageDef::new(stage(BUILD_STAGE), Arc::new(build))
                .input(artifact(SOURCE_ARTIFACT))
                .output(artifact(IMAGE_ARTIFACT)),
        )
        .stage(
            StageDef::new(stage(DEPLOY_STAGE), Arc::new(deploy))
                .input(artifact(IMAGE_ARTIFACT))
                .output(artifact(RELEASE_ARTIFACT)),
        )
        .build()
}
