// ABOUTME: In-memory state store for tests and one-shot runs.
// ABOUTME: Records are cloned in and out so callers never share mutable state.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{StateError, StateStore};
use crate::deploy::Deployment;
use crate::pipeline::ExecutionRecord;
use crate::types::{DeploymentId, ExecutionId};

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    executions: RwLock<HashMap<ExecutionId, ExecutionRecord>>,
    deployments: RwLock<HashMap<DeploymentId, Deployment>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), StateError> {
        self.executions
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_execution(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<ExecutionRecord>, StateError> {
        Ok(self.executions.read().get(id).cloned())
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionRecord>, StateError> {
        let mut records: Vec<_> = self.executions.read().values().cloned().collect();
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }

    async fn save_deployment(&self, deployment: &Deployment) -> Result<(), StateError> {
        self.deployments
            .write()
            .insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn load_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, StateError> {
        Ok(self.deployments.read().get(id).cloned())
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, StateError> {
        let mut records: Vec<_> = self.deployments.read().values().cloned().collect();
        records.sort_by_key(|d| d.created_at);
        Ok(records)
    }
}
