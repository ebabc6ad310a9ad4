// ABOUTME: Validate command implementation.
// ABOUTME: Resolves the config and builds the pipeline without running anything.

use blueshift::deploy::BlueGreenController;
use blueshift::error::Result;
use blueshift::ops::Collaborators;
use blueshift::output::Output;
use blueshift::pipeline::release_pipeline;
use blueshift::state::MemoryStateStore;
use std::sync::Arc;

use super::release::load_settings;

pub fn validate(output: Output) -> Result<()> {
    let settings = load_settings()?;

    // Wiring is checked against throwaway stores; nothing touches the state dir.
    let collaborators = Collaborators::shell(settings.shell_ops());
    let controller = BlueGreenController::new(
        collaborators.task_sets.clone(),
        collaborators.health.clone(),
        Arc::new(MemoryStateStore::new()),
        settings.deploy.clone(),
    );
    let definition = release_pipeline(&settings, &collaborators, Arc::new(controller))?;

    let stages: Vec<String> = definition.stages().map(|s| s.name().to_string()).collect();
    output.progress(&format!("Pipeline:  {}", settings.pipeline));
    output.progress(&format!("Stages:    {}", stages.join(" -> ")));
    output.progress(&format!("Target:    {}", settings.target));
    output.progress(&format!("Policy:    {}", settings.deploy.policy));
    output.success("Configuration is valid");
    Ok(())
}
