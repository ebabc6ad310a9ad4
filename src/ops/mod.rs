// ABOUTME: Capability traits for the external collaborators of a release.
// ABOUTME: Defines SourceOps, BuildOps, TaskSetOps, HealthCheck, and a shell-command implementation.

mod build;
mod health;
mod shell;
mod source;
mod target;
mod task_set;

pub use build::{BuildError, BuildOps};
pub use health::{HealthCheck, HealthError, HealthStatus};
pub use shell::{ShellCommands, ShellOps};
pub use source::{SourceArtifact, SourceError, SourceOps};
pub use target::ExecutionTarget;
pub use task_set::{PrimaryTaskSet, Slot, TaskSetError, TaskSetOps, TaskSetSpec};

use std::sync::Arc;

/// One implementation of every collaborator a release needs.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceOps>,
    pub build: Arc<dyn BuildOps>,
    pub task_sets: Arc<dyn TaskSetOps>,
    pub health: Arc<dyn HealthCheck>,
}

impl Collaborators {
    /// Use shell commands for everything.
    pub fn shell(ops: ShellOps) -> Self {
        let ops = Arc::new(ops);
        Self {
            source: ops.clone(),
            build: ops.clone(),
            task_sets: ops.clone(),
            health: ops,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
