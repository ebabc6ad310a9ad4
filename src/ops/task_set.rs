// ABOUTME: Task set operations trait for the execution target.
// ABOUTME: Create and destroy task sets and apply blue/green traffic weights.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ExecutionTarget;
use crate::types::{ImageRef, TaskSetId, TrafficSplit};

/// Which side of a blue/green deployment a task set is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// The task set serving traffic before the deployment began.
    Blue,
    /// The replacement task set running the new image.
    Green,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Blue => write!(f, "blue"),
            Slot::Green => write!(f, "green"),
        }
    }
}

/// What to run in a new task set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSetSpec {
    pub slot: Slot,
    pub image: ImageRef,
    pub container_port: u16,
    pub task_role: String,
}

/// The task set currently holding all traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryTaskSet {
    pub id: TaskSetId,
    pub image: ImageRef,
}

/// Task set lifecycle and traffic routing.
#[async_trait]
pub trait TaskSetOps: Send + Sync {
    /// Find the task set currently carrying 100% of traffic, if any.
    async fn primary_task_set(
        &self,
        target: &ExecutionTarget,
    ) -> Result<Option<PrimaryTaskSet>, TaskSetError>;

    /// Create and register a task set receiving no traffic.
    async fn create_task_set(
        &self,
        target: &ExecutionTarget,
        spec: &TaskSetSpec,
    ) -> Result<TaskSetId, TaskSetError>;

    /// Route traffic according to `split`. `blue` is absent on a first deployment.
    async fn apply_weights(
        &self,
        target: &ExecutionTarget,
        blue: Option<&TaskSetId>,
        green: &TaskSetId,
        split: TrafficSplit,
    ) -> Result<(), TaskSetError>;

    /// Deregister and destroy a task set.
    async fn destroy_task_set(
        &self,
        target: &ExecutionTarget,
        id: &TaskSetId,
    ) -> Result<(), TaskSetError>;
}

/// Errors from task set operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskSetError {
    #[error("task set not found: {0}")]
    NotFound(String),

    #[error("failed to create task set: {0}")]
    CreateFailed(String),

    #[error("traffic update rejected: {0}")]
    Rejected(String),

    #[error("execution target unreachable: {0}")]
    Unreachable(String),
}
