// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates a commented blueshift.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::PipelineName;

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, pipeline: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let pipeline = match pipeline {
        Some(name) => PipelineName::new(name).map_err(|e| Error::invalid_config(e.to_string()))?,
        None => PipelineName::new("my-app").map_err(|e| Error::invalid_config(e.to_string()))?,
    };

    std::fs::write(&config_path, generate_template_yaml(&pipeline))?;

    Ok(())
}

pub fn generate_template_yaml(pipeline: &PipelineName) -> String {
    format!(
        r#"pipeline: {pipeline}

source:
  repo: git@github.com:my-org/{pipeline}.git
  branch: main
  # Prints "<commit-id> [<content-ref>]"
  command: ./deploy/checkout.sh

build:
  image_repository: registry.example.com/my-org/{pipeline}
  # Prints the pushed image reference
  command: ./deploy/build.sh

deploy:
  # Linear10PercentEvery1Minutes, Linear10PercentEvery3Minutes,
  # Canary10Percent5Minutes, Canary10Percent15Minutes or AllAtOnce
  deployment_config: Linear10PercentEvery1Minutes
  termination_time_minutes: 10
  container_port: 8080
  task_role: {{ env: TASK_ROLE }}
  # validation_window: 2m
  # termination:
  #   retries: 3
  #   retry_interval: 30s

health:
  # Exit status 0 means healthy
  command: ./deploy/health.sh
  interval: 10s
  timeout: 5s

target:
  name: production
  # Prints "<task-set-id> <image>" for the live task set, or nothing
  primary: ./deploy/primary.sh
  create: ./deploy/create.sh
  weights: ./deploy/weights.sh
  destroy: ./deploy/destroy.sh
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn template_parses() {
        let yaml = generate_template_yaml(&PipelineName::new("web").unwrap());
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.pipeline, "web");
        assert_eq!(config.deploy.container_port, 8080);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), None, false).unwrap();
        assert!(matches!(
            init_config(dir.path(), None, false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), Some("api"), true).unwrap();
    }
}
