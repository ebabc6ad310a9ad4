// ABOUTME: Health-check provider trait.
// ABOUTME: Reports whether a task set is healthy, with a reason when it is not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ExecutionTarget;
use crate::types::TaskSetId;

/// Health signal for a task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Check the health of one task set.
    async fn check(
        &self,
        target: &ExecutionTarget,
        task_set: &TaskSetId,
    ) -> Result<HealthStatus, HealthError>;
}

/// The provider could not produce a signal at all.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("health provider unavailable: {0}")]
    Unavailable(String),

    #[error("health check timed out after {}", readable(.0))]
    Timeout(Duration),
}

fn readable(duration: &Duration) -> humantime_serde::re::humantime::FormattedDuration {
    humantime_serde::re::humantime::format_duration(*duration)
}
