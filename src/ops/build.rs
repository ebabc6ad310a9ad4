// ABOUTME: Build executor trait.
// ABOUTME: Turns a source artifact into a container image reference.

use async_trait::async_trait;

use super::SourceArtifact;
use crate::types::ImageRef;

/// Builds container images. Retries, if any, are the implementor's policy.
#[async_trait]
pub trait BuildOps: Send + Sync {
    /// Build and publish an image from `source`.
    async fn build(&self, source: &SourceArtifact) -> Result<ImageRef, BuildError>;
}

/// Errors from the build executor.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The build ran and failed; `log` holds its output.
    #[error("build failed:\n{log}")]
    Failed { log: String },

    /// The build produced something that is not an image reference.
    #[error("build produced an invalid image reference: {0}")]
    InvalidImage(String),

    #[error("build executor unavailable: {0}")]
    Unavailable(String),
}
