// ABOUTME: Run and resume command implementations.
// ABOUTME: Execute the release pipeline, or continue an interrupted execution.

use super::release::{Release, cancel_on_ctrl_c, load_settings};
use blueshift::error::Result;
use blueshift::output::Output;
use blueshift::pipeline::Trigger;
use blueshift::types::ExecutionId;

pub async fn run(revision: Option<String>, force: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let settings = load_settings()?;
    let release = Release::prepare(settings, force, output.mode()).await?;

    let mut trigger = Trigger::new("manual");
    if let Some(revision) = revision {
        trigger = trigger.with_revision(revision);
    }

    output.progress(&format!(
        "Releasing {} from {}@{} to {}",
        release.settings.pipeline,
        release.settings.source.repo,
        trigger
            .revision
            .as_deref()
            .unwrap_or(&release.settings.source.branch),
        release.settings.target
    ));

    let cancel = cancel_on_ctrl_c();
    let result = release
        .orchestrator
        .execute(&release.definition, trigger, &cancel)
        .await?;

    release.finish(result, &output).await
}

pub async fn resume(execution_id: String, force: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let settings = load_settings()?;
    let release = Release::prepare(settings, force, output.mode()).await?;

    let id = ExecutionId::new(execution_id);
    output.progress(&format!("Resuming execution {}", id));

    let cancel = cancel_on_ctrl_c();
    let result = release
        .orchestrator
        .resume(&release.definition, &id, &cancel)
        .await?;

    release.finish(result, &output).await
}
