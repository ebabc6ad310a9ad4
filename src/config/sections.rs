// ABOUTME: Section types of blueshift.yml.
// ABOUTME: Each section deserializes with defaults; validation happens in Config::resolve.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::EnvValue;
use crate::artifact::Retention;
use crate::policy::{DeploymentConfigName, TrafficShiftPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub repo: EnvValue,

    #[serde(default = "default_branch")]
    pub branch: EnvValue,

    /// Prints `<commit-id> [<content-ref>]`.
    #[serde(default)]
    pub command: Option<String>,
}

fn default_branch() -> EnvValue {
    EnvValue::from("main")
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub image_repository: EnvValue,

    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// One of the named configurations; ignored when `policy` is set.
    #[serde(default)]
    pub deployment_config: Option<DeploymentConfigName>,

    #[serde(default)]
    pub policy: Option<TrafficShiftPolicy>,

    #[serde(default = "default_termination_minutes")]
    pub termination_time_minutes: u64,

    pub container_port: u16,

    pub task_role: EnvValue,

    #[serde(default, with = "humantime_serde")]
    pub validation_window: Duration,

    #[serde(default)]
    pub termination: TerminationConfig,
}

fn default_termination_minutes() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminationConfig {
    #[serde(default = "default_termination_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            retries: default_termination_retries(),
            retry_interval: default_retry_interval(),
        }
    }
}

fn default_termination_retries() -> u32 {
    3
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Exit status 0 means healthy.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_startup_timeout", with = "humantime_serde")]
    pub startup_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            command: None,
            interval: default_interval(),
            timeout: default_timeout(),
            retries: 0,
            startup_timeout: default_startup_timeout(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(300)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: EnvValue,

    #[serde(default)]
    pub attributes: BTreeMap<String, EnvValue>,

    /// Prints `<task-set-id> <image>` for the task set holding traffic, or nothing.
    #[serde(default)]
    pub primary: Option<String>,

    /// Prints the new task set id.
    #[serde(default)]
    pub create: Option<String>,

    #[serde(default)]
    pub weights: Option<String>,

    #[serde(default)]
    pub destroy: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub retention: Retention,
}
