// ABOUTME: Application-wide error type for blueshift.
// ABOUTME: Aggregates config, wiring, pipeline, deploy, and state errors for the CLI.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::pipeline::{FailureKind, PipelineError, WiringError};
use crate::state::StateError;
use crate::types::{ExecutionId, StageName};

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid pipeline wiring: {0}")]
    Wiring(#[from] WiringError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("execution {execution_id} failed at stage {stage} ({kind}): {cause}")]
    ExecutionFailed {
        execution_id: ExecutionId,
        stage: StageName,
        kind: FailureKind,
        cause: String,
    },

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
