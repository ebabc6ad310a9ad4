// ABOUTME: Source artifact producer trait.
// ABOUTME: Checks out a repository branch into a versioned content bundle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Versioned source bundle produced by a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArtifact {
    /// Commit the bundle was taken from.
    pub commit_id: String,
    /// Opaque handle to the bundle content.
    pub content_ref: String,
}

/// Checks out source code. Credentials are the implementor's concern.
#[async_trait]
pub trait SourceOps: Send + Sync {
    /// Check out `branch` of `repo`, pinned to `revision` when given.
    async fn checkout(
        &self,
        repo: &str,
        branch: &str,
        revision: Option<&str>,
    ) -> Result<SourceArtifact, SourceError>;
}

/// Errors from source checkout.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    #[error("checkout failed: {0}")]
    Failed(String),
}
