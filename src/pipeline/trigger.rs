// ABOUTME: The event that starts a pipeline execution.
// ABOUTME: Carries a human-readable reason, an optional revision, and any trigger-supplied artifacts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::artifact::ArtifactContent;
use crate::types::ArtifactName;

#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub reason: String,
    /// Source revision to release; `None` means the head of the configured branch.
    pub revision: Option<String>,
    pub artifacts: BTreeMap<ArtifactName, ArtifactContent>,
}

impl Trigger {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_artifact(mut self, name: ArtifactName, content: ArtifactContent) -> Self {
        self.artifacts.insert(name, content);
        self
    }

    pub fn info(&self) -> TriggerInfo {
        TriggerInfo {
            reason: self.reason.clone(),
            revision: self.revision.clone(),
        }
    }
}

/// The persisted part of a trigger; its artifacts live in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub reason: String,
    #[serde(default)]
    pub revision: Option<String>,
}

impl From<TriggerInfo> for Trigger {
    fn from(info: TriggerInfo) -> Self {
        Trigger {
            reason: info.reason,
            revision: info.revision,
            artifacts: BTreeMap::new(),
        }
    }
}
