// ABOUTME: Resolved settings that drive the blue/green controller.
// ABOUTME: Built from configuration once and passed explicitly to the controller.

use std::path::PathBuf;
use std::time::Duration;

use crate::policy::TrafficShiftPolicy;

/// How the controller polls the health-check provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSettings {
    /// Delay between polls while waiting or monitoring.
    pub interval: Duration,
    /// Upper bound on a single check.
    pub timeout: Duration,
    /// Extra checks before an unhealthy result triggers rollback.
    pub retries: u32,
    /// How long green may take to become healthy at weight 0.
    pub startup_timeout: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            retries: 0,
            startup_timeout: Duration::from_secs(300),
        }
    }
}

/// Retry policy for destroying the old task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationRetry {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for TerminationRetry {
    fn default() -> Self {
        Self {
            retries: 3,
            interval: Duration::from_secs(30),
        }
    }
}

/// Per-target deploy lock placement and queueing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    pub dir: PathBuf,
    /// How long to queue behind another execution before giving up.
    pub timeout: Duration,
    /// Break a lock held by someone else.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    pub policy: TrafficShiftPolicy,
    /// Drain time for blue after full cutover.
    pub termination_time: Duration,
    pub container_port: u16,
    pub task_role: String,
    /// Observation period at full weight before finalizing.
    pub validation_window: Duration,
    pub termination: TerminationRetry,
    pub health: HealthSettings,
    pub lock: Option<LockSettings>,
}

impl DeploySettings {
    pub fn new(policy: TrafficShiftPolicy, container_port: u16, task_role: impl Into<String>) -> Self {
        Self {
            policy,
            termination_time: Duration::from_secs(10 * 60),
            container_port,
            task_role: task_role.into(),
            validation_window: Duration::ZERO,
            termination: TerminationRetry::default(),
            health: HealthSettings::default(),
            lock: None,
        }
    }
}
