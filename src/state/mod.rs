// ABOUTME: Durable record of execution and deployment progress.
// ABOUTME: Lets an interrupted execution resume from its last recorded state.

mod error;
mod file;
mod memory;

pub use error::StateError;
pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use async_trait::async_trait;

use crate::deploy::Deployment;
use crate::pipeline::ExecutionRecord;
use crate::types::{DeploymentId, ExecutionId};

/// Persistence for execution and deployment records.
///
/// Saving replaces the previous version of a record with the same id.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), StateError>;

    async fn load_execution(&self, id: &ExecutionId)
    -> Result<Option<ExecutionRecord>, StateError>;

    /// All executions, oldest first.
    async fn list_executions(&self) -> Result<Vec<ExecutionRecord>, StateError>;

    async fn save_deployment(&self, deployment: &Deployment) -> Result<(), StateError>;

    async fn load_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, StateError>;

    /// All deployments, oldest first.
    async fn list_deployments(&self) -> Result<Vec<Deployment>, StateError>;
}
