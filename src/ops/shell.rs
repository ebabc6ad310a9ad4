// ABOUTME: Collaborator implementation backed by user-configured shell commands.
// ABOUTME: Commands receive BLUESHIFT_* environment variables and report results on stdout.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{
    BuildError, BuildOps, ExecutionTarget, HealthCheck, HealthError, HealthStatus,
    PrimaryTaskSet, SourceArtifact, SourceError, SourceOps, TaskSetError, TaskSetOps, TaskSetSpec,
};
use crate::types::{ImageRef, TaskSetId, TrafficSplit};

/// Shell commands implementing each collaborator operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellCommands {
    /// Prints `<commit-id> [<content-ref>]`.
    #[serde(default)]
    pub checkout: Option<String>,
    /// Prints the built image reference (optional; defaults to repository:commit).
    #[serde(default)]
    pub build: Option<String>,
    /// Prints `<task-set-id> <image>` for the primary task set, or nothing.
    #[serde(default)]
    pub primary: Option<String>,
    /// Prints the new task set id.
    #[serde(default)]
    pub create: Option<String>,
    #[serde(default)]
    pub weights: Option<String>,
    #[serde(default)]
    pub destroy: Option<String>,
    /// Exit status 0 means healthy.
    #[serde(default)]
    pub health: Option<String>,
}

/// Outcome of one command run.
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// Last non-empty line of stdout.
    fn last_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).rfind(|l| !l.is_empty())
    }

    fn describe_failure(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {:?}", self.exit_code)
        } else {
            stderr.to_string()
        }
    }
}

/// Runs collaborator operations as shell commands.
#[derive(Debug, Clone)]
pub struct ShellOps {
    commands: ShellCommands,
    image_repository: ImageRef,
    working_dir: PathBuf,
    health_timeout: Duration,
}

impl ShellOps {
    pub fn new(
        commands: ShellCommands,
        image_repository: ImageRef,
        working_dir: impl Into<PathBuf>,
        health_timeout: Duration,
    ) -> Self {
        Self {
            commands,
            image_repository,
            working_dir: working_dir.into(),
            health_timeout,
        }
    }

    fn command<'a>(&'a self, name: &str, cmd: &'a Option<String>) -> Result<&'a str, String> {
        cmd.as_deref()
            .ok_or_else(|| format!("no `{}` command configured", name))
    }

    async fn run(&self, cmd: &str, env: &HashMap<String, String>) -> Result<CommandOutput, String> {
        tracing::debug!(command = cmd, "running collaborator command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .envs(env)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to spawn `{}`: {}", cmd, e))?;

        let result = CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.success {
            tracing::warn!(
                command = cmd,
                exit_code = ?result.exit_code,
                "collaborator command failed"
            );
        }
        Ok(result)
    }
}

fn target_env(target: &ExecutionTarget) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("BLUESHIFT_TARGET".to_string(), target.name.clone());
    for (key, value) in &target.attributes {
        let key = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect::<String>();
        env.insert(format!("BLUESHIFT_TARGET_{}", key), value.clone());
    }
    env
}

#[async_trait]
impl SourceOps for ShellOps {
    async fn checkout(
        &self,
        repo: &str,
        branch: &str,
        revision: Option<&str>,
    ) -> Result<SourceArtifact, SourceError> {
        let cmd = self
            .command("checkout", &self.commands.checkout)
            .map_err(SourceError::Failed)?;

        let mut env = HashMap::new();
        env.insert("BLUESHIFT_REPO".to_string(), repo.to_string());
        env.insert("BLUESHIFT_BRANCH".to_string(), branch.to_string());
        if let Some(rev) = revision {
            env.insert("BLUESHIFT_REVISION".to_string(), rev.to_string());
        }

        let output = self.run(cmd, &env).await.map_err(SourceError::Failed)?;
        if !output.success {
            return Err(SourceError::Failed(output.describe_failure()));
        }

        let line = output
            .last_line()
            .ok_or_else(|| SourceError::Failed("checkout printed no commit id".to_string()))?;
        let mut parts = line.split_whitespace();
        let commit_id = parts.next().unwrap_or_default().to_string();
        let content_ref = parts
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| self.working_dir.display().to_string());

        Ok(SourceArtifact {
            commit_id,
            content_ref,
        })
    }
}

#[async_trait]
impl BuildOps for ShellOps {
    async fn build(&self, source: &SourceArtifact) -> Result<ImageRef, BuildError> {
        let cmd = self
            .command("build", &self.commands.build)
            .map_err(BuildError::Unavailable)?;

        let tag: String = source.commit_id.chars().take(12).collect();
        let default_image = self
            .image_repository
            .with_tag(&tag)
            .map_err(|e| BuildError::InvalidImage(e.to_string()))?;

        let mut env = HashMap::new();
        env.insert("BLUESHIFT_COMMIT".to_string(), source.commit_id.clone());
        env.insert("BLUESHIFT_SOURCE_REF".to_string(), source.content_ref.clone());
        env.insert(
            "BLUESHIFT_IMAGE_REPOSITORY".to_string(),
            self.image_repository.repository(),
        );
        env.insert("BLUESHIFT_IMAGE".to_string(), default_image.to_string());

        let output = self.run(cmd, &env).await.map_err(BuildError::Unavailable)?;
        if !output.success {
            return Err(BuildError::Failed {
                log: format!("{}{}", output.stdout, output.stderr),
            });
        }

        match output.last_line() {
            Some(line) => ImageRef::parse(line).map_err(|_| BuildError::InvalidImage(line.to_string())),
            None => Ok(default_image),
        }
    }
}

#[async_trait]
impl TaskSetOps for ShellOps {
    async fn primary_task_set(
        &self,
        target: &ExecutionTarget,
    ) -> Result<Option<PrimaryTaskSet>, TaskSetError> {
        // Without a discovery command every deployment is a first deployment.
        let Some(cmd) = self.commands.primary.as_deref() else {
            return Ok(None);
        };

        let output = self
            .run(cmd, &target_env(target))
            .await
            .map_err(TaskSetError::Unreachable)?;
        if !output.success {
            return Err(TaskSetError::Unreachable(output.describe_failure()));
        }

        let Some(line) = output.last_line() else {
            return Ok(None);
        };
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(id), Some(image)) => {
                let image = ImageRef::parse(image)
                    .map_err(|e| TaskSetError::Unreachable(format!("bad primary image: {}", e)))?;
                Ok(Some(PrimaryTaskSet {
                    id: TaskSetId::new(id),
                    image,
                }))
            }
            _ => Err(TaskSetError::Unreachable(format!(
                "expected `<task-set-id> <image>`, got `{}`",
                line
            ))),
        }
    }

    async fn create_task_set(
        &self,
        target: &ExecutionTarget,
        spec: &TaskSetSpec,
    ) -> Result<TaskSetId, TaskSetError> {
        let cmd = self
            .command("create", &self.commands.create)
            .map_err(TaskSetError::CreateFailed)?;

        let mut env = target_env(target);
        env.insert("BLUESHIFT_SLOT".to_string(), spec.slot.to_string());
        env.insert("BLUESHIFT_IMAGE".to_string(), spec.image.to_string());
        env.insert(
            "BLUESHIFT_CONTAINER_PORT".to_string(),
            spec.container_port.to_string(),
        );
        env.insert("BLUESHIFT_TASK_ROLE".to_string(), spec.task_role.clone());

        let output = self.run(cmd, &env).await.map_err(TaskSetError::CreateFailed)?;
        if !output.success {
            return Err(TaskSetError::CreateFailed(output.describe_failure()));
        }
        output
            .last_line()
            .map(TaskSetId::new)
            .ok_or_else(|| TaskSetError::CreateFailed("create printed no task set id".to_string()))
    }

    async fn apply_weights(
        &self,
        target: &ExecutionTarget,
        blue: Option<&TaskSetId>,
        green: &TaskSetId,
        split: TrafficSplit,
    ) -> Result<(), TaskSetError> {
        let cmd = self
            .command("weights", &self.commands.weights)
            .map_err(TaskSetError::Rejected)?;

        let mut env = target_env(target);
        if let Some(blue) = blue {
            env.insert("BLUESHIFT_BLUE_TASK_SET".to_string(), blue.to_string());
        }
        env.insert("BLUESHIFT_GREEN_TASK_SET".to_string(), green.to_string());
        env.insert(
            "BLUESHIFT_BLUE_WEIGHT".to_string(),
            split.blue().get().to_string(),
        );
        env.insert(
            "BLUESHIFT_GREEN_WEIGHT".to_string(),
            split.green().get().to_string(),
        );

        let output = self.run(cmd, &env).await.map_err(TaskSetError::Unreachable)?;
        if !output.success {
            return Err(TaskSetError::Rejected(output.describe_failure()));
        }
        Ok(())
    }

    async fn destroy_task_set(
        &self,
        target: &ExecutionTarget,
        id: &TaskSetId,
    ) -> Result<(), TaskSetError> {
        let cmd = self
            .command("destroy", &self.commands.destroy)
            .map_err(TaskSetError::Unreachable)?;

        let mut env = target_env(target);
        env.insert("BLUESHIFT_TASK_SET".to_string(), id.to_string());

        let output = self.run(cmd, &env).await.map_err(TaskSetError::Unreachable)?;
        if !output.success {
            return Err(TaskSetError::Unreachable(output.describe_failure()));
        }
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for ShellOps {
    async fn check(
        &self,
        target: &ExecutionTarget,
        task_set: &TaskSetId,
    ) -> Result<HealthStatus, HealthError> {
        let cmd = self
            .command("health", &self.commands.health)
            .map_err(HealthError::Unavailable)?;

        let mut env = target_env(target);
        env.insert("BLUESHIFT_TASK_SET".to_string(), task_set.to_string());

        let output = tokio::time::timeout(self.health_timeout, self.run(cmd, &env))
            .await
            .map_err(|_| HealthError::Timeout(self.health_timeout))?
            .map_err(HealthError::Unavailable)?;

        if output.success {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy(output.describe_failure()))
        }
    }
}
