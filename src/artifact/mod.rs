// ABOUTME: Immutable, versioned artifacts passed between pipeline stages.
// ABOUTME: Exports the Artifact model and the append-only stores that hold them.

mod store;

pub use store::{ArtifactError, ArtifactStore, FileArtifactStore, MemoryArtifactStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ArtifactId, ArtifactName, ImageRef};

/// Producer name recorded on artifacts supplied by the triggering event.
pub const TRIGGER_PRODUCER: &str = "trigger";

/// Typed payload of an artifact. Content is a handle, never the data itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactContent {
    /// Versioned source bundle from the source artifact producer.
    Source { commit_id: String, content_ref: String },
    /// Container image produced by the build executor.
    Image { image: ImageRef },
    /// Any other opaque handle.
    Opaque { uri: String },
}

impl ArtifactContent {
    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            ArtifactContent::Image { image } => Some(image),
            _ => None,
        }
    }

    pub fn as_source(&self) -> Option<(&str, &str)> {
        match self {
            ArtifactContent::Source {
                commit_id,
                content_ref,
            } => Some((commit_id, content_ref)),
            _ => None,
        }
    }
}

/// An artifact produced by a stage (or the trigger). Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    id: ArtifactId,
    name: ArtifactName,
    producer: String,
    content: ArtifactContent,
    created_at: DateTime<Utc>,
}

impl Artifact {
    pub(crate) fn new(producer: &str, name: ArtifactName, content: ArtifactContent) -> Self {
        Self {
            id: ArtifactId::generate(),
            name,
            producer: producer.to_string(),
            content,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    pub fn name(&self) -> &ArtifactName {
        &self.name
    }

    /// Stage name (or `trigger`) that produced this artifact.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn content(&self) -> &ArtifactContent {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// What the orchestrator does with artifacts once no later stage needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Retention {
    /// Release after the last consuming stage succeeds; terminal outputs survive the execution.
    #[default]
    ReleaseWhenUnused,
    /// Never release; an external retention policy cleans up.
    KeepAll,
}
