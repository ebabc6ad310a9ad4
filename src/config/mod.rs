// ABOUTME: Configuration types and parsing for blueshift.yml.
// ABOUTME: Parses YAML once and resolves it into explicit ReleaseSettings.

mod env_value;
mod init;
mod sections;

pub use env_value::{EnvValue, resolve_env_map};
pub use init::{generate_template_yaml, init_config};
pub use sections::{
    ArtifactsConfig, BuildConfig, DeployConfig, HealthConfig, SourceConfig, TargetConfig,
    TerminationConfig,
};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifact::Retention;
use crate::deploy::{DeploySettings, HealthSettings, LockSettings, TerminationRetry};
use crate::error::{Error, Result};
use crate::ops::{ExecutionTarget, ShellCommands, ShellOps};
use crate::policy::TrafficShiftPolicy;
use crate::types::{ImageRef, PipelineName};

pub const CONFIG_FILENAME: &str = "blueshift.yml";
pub const CONFIG_FILENAME_ALT: &str = "blueshift.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".blueshift/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipeline: String,

    pub source: SourceConfig,

    pub build: BuildConfig,

    pub deploy: DeployConfig,

    #[serde(default)]
    pub health: HealthConfig,

    pub target: TargetConfig,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".blueshift/state")
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Source location a release checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub repo: String,
    pub branch: String,
}

/// Fully resolved, validated settings for one release pipeline.
///
/// Built once from [`Config`]; nothing downstream reads the environment again.
#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    pub pipeline: PipelineName,
    pub source: SourceSettings,
    pub image_repository: ImageRef,
    pub deploy: DeploySettings,
    pub target: ExecutionTarget,
    pub state_dir: PathBuf,
    pub retention: Retention,
    /// Directory commands run in; relative paths in the config resolve against it.
    pub working_dir: PathBuf,
    pub commands: ShellCommands,
}

impl ReleaseSettings {
    pub fn shell_ops(&self) -> ShellOps {
        ShellOps::new(
            self.commands.clone(),
            self.image_repository.clone(),
            self.working_dir.clone(),
            self.deploy.health.timeout,
        )
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_dir.join("artifacts")
    }

    /// Break a deploy lock held by another execution.
    pub fn force_lock(&mut self) {
        if let Some(lock) = self.deploy.lock.as_mut() {
            lock.force = true;
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Find the config file in `dir`, returning it with its path.
    pub fn discover(dir: &Path) -> Result<(Self, PathBuf)> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in candidates {
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((config, path));
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// The traffic-shift policy in effect; an explicit `policy` wins over `deployment_config`.
    pub fn policy(&self) -> TrafficShiftPolicy {
        self.deploy
            .policy
            .or_else(|| self.deploy.deployment_config.map(|name| name.policy()))
            .unwrap_or_default()
    }

    pub fn shell_commands(&self) -> ShellCommands {
        ShellCommands {
            checkout: self.source.command.clone(),
            build: self.build.command.clone(),
            primary: self.target.primary.clone(),
            create: self.target.create.clone(),
            weights: self.target.weights.clone(),
            destroy: self.target.destroy.clone(),
            health: self.health.command.clone(),
        }
    }

    /// Validate and resolve env references. `base_dir` anchors relative paths.
    pub fn resolve(&self, base_dir: &Path) -> Result<ReleaseSettings> {
        let pipeline = PipelineName::new(&self.pipeline)
            .map_err(|e| Error::invalid_config(format!("pipeline: {}", e)))?;

        if self.deploy.termination_time_minutes == 0 {
            return Err(Error::invalid_config(
                "deploy.termination_time_minutes must be positive",
            ));
        }
        if self.deploy.container_port == 0 {
            return Err(Error::invalid_config("deploy.container_port must be positive"));
        }
        if self.health.interval.is_zero() {
            return Err(Error::invalid_config("health.interval must be positive"));
        }
        if self.health.timeout.is_zero() {
            return Err(Error::invalid_config("health.timeout must be positive"));
        }

        let commands = self.shell_commands();
        let missing = missing_commands(&commands);
        if !missing.is_empty() {
            return Err(Error::invalid_config(format!(
                "missing commands: {}",
                missing.join(", ")
            )));
        }

        let image_repository = self.build.image_repository.resolve_required("build.image_repository")?;
        let image_repository = ImageRef::parse(&image_repository)
            .map_err(|e| Error::invalid_config(format!("build.image_repository: {}", e)))?;

        let target = ExecutionTarget {
            name: self.target.name.resolve_required("target.name")?,
            attributes: resolve_env_map(&self.target.attributes)?,
        };

        let state_dir = base_dir.join(&self.state_dir);

        let deploy = DeploySettings {
            policy: self.policy(),
            termination_time: Duration::from_secs(self.deploy.termination_time_minutes * 60),
            container_port: self.deploy.container_port,
            task_role: self.deploy.task_role.resolve_required("deploy.task_role")?,
            validation_window: self.deploy.validation_window,
            termination: TerminationRetry {
                retries: self.deploy.termination.retries,
                interval: self.deploy.termination.retry_interval,
            },
            health: HealthSettings {
                interval: self.health.interval,
                timeout: self.health.timeout,
                retries: self.health.retries,
                startup_timeout: self.health.startup_timeout,
            },
            lock: Some(LockSettings {
                dir: state_dir.join("locks"),
                timeout: self.lock_timeout,
                force: false,
            }),
        };

        Ok(ReleaseSettings {
            pipeline,
            source: SourceSettings {
                repo: self.source.repo.resolve_required("source.repo")?,
                branch: self.source.branch.resolve_required("source.branch")?,
            },
            image_repository,
            deploy,
            target,
            state_dir,
            retention: self.artifacts.retention,
            working_dir: base_dir.to_path_buf(),
            commands,
        })
    }
}

fn missing_commands(commands: &ShellCommands) -> Vec<&'static str> {
    [
        ("source.command", &commands.checkout),
        ("build.command", &commands.build),
        ("target.create", &commands.create),
        ("target.weights", &commands.weights),
        ("target.destroy", &commands.destroy),
        ("health.command", &commands.health),
    ]
    .into_iter()
    .filter(|(_, cmd)| cmd.as_deref().is_none_or(|c| c.trim().is_empty()))
    .map(|(name, _)| name)
    .collect()
}
