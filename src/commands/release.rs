// ABOUTME: Shared wiring for commands that execute the release pipeline.
// ABOUTME: Builds stores, collaborators, controller, and orchestrator from resolved settings.

use blueshift::artifact::FileArtifactStore;
use blueshift::config::{Config, ReleaseSettings};
use blueshift::deploy::BlueGreenController;
use blueshift::diagnostics::Diagnostics;
use blueshift::error::{Error, Result};
use blueshift::ops::Collaborators;
use blueshift::output::{Output, OutputMode};
use blueshift::pipeline::{
    CancelHandle, Cancellation, Orchestrator, PipelineDef, PipelineEvent, PipelineResult,
    release_pipeline,
};
use blueshift::state::FileStateStore;
use futures::{Stream, StreamExt};
use std::env;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Load and resolve the config found in the working directory.
pub fn load_settings() -> Result<ReleaseSettings> {
    let cwd = env::current_dir()?;
    let (config, path) = Config::discover(&cwd)?;
    let base_dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| cwd.clone());
    // .blueshift/config.yml resolves relative to the project, not the .blueshift dir
    let base_dir = if base_dir.ends_with(".blueshift") {
        cwd
    } else {
        base_dir
    };
    config.resolve(&base_dir)
}

/// Everything needed to execute or resume the release pipeline.
pub struct Release {
    pub settings: ReleaseSettings,
    pub definition: PipelineDef,
    pub orchestrator: Orchestrator,
    pub diagnostics: Arc<Diagnostics>,
    printer: JoinHandle<()>,
}

impl Release {
    pub async fn prepare(mut settings: ReleaseSettings, force: bool, mode: OutputMode) -> Result<Self> {
        if force {
            settings.force_lock();
        }

        let state = Arc::new(FileStateStore::open(&settings.state_dir).await?);
        let artifacts = Arc::new(FileArtifactStore::open(settings.artifacts_dir())?);
        let diagnostics = Arc::new(Diagnostics::default());
        let collaborators = Collaborators::shell(settings.shell_ops());

        let controller = BlueGreenController::new(
            collaborators.task_sets.clone(),
            collaborators.health.clone(),
            state.clone(),
            settings.deploy.clone(),
        )
        .with_diagnostics(diagnostics.clone());

        let definition = release_pipeline(&settings, &collaborators, Arc::new(controller))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(artifacts, state)
            .with_retention(settings.retention)
            .with_events(tx)
            .with_diagnostics(diagnostics.clone());

        Ok(Self {
            settings,
            definition,
            orchestrator,
            diagnostics,
            printer: tokio::spawn(print_events(rx, mode)),
        })
    }

    /// Drain remaining events, then report warnings and the result.
    pub async fn finish(self, result: PipelineResult, output: &Output) -> Result<()> {
        let Release {
            orchestrator,
            diagnostics,
            printer,
            ..
        } = self;
        // Dropping the orchestrator closes the event channel.
        drop(orchestrator);
        if let Err(e) = printer.await {
            tracing::debug!(error = %e, "event printer ended abnormally");
        }

        for warning in diagnostics.warnings() {
            output.warning(&warning);
        }

        match result {
            PipelineResult::Succeeded {
                execution_id,
                artifacts,
            } => {
                let names: Vec<String> = artifacts.iter().map(|a| a.name().to_string()).collect();
                output.success(&format!(
                    "Execution {} succeeded ({})",
                    execution_id,
                    names.join(", ")
                ));
                Ok(())
            }
            PipelineResult::Failed {
                execution_id,
                stage,
                cause,
                kind,
            } => Err(Error::ExecutionFailed {
                execution_id,
                stage,
                kind,
                cause,
            }),
        }
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<PipelineEvent>, mode: OutputMode) {
    let output = Output::new(mode);
    while let Some(event) = rx.recv().await {
        output.event(&event);
    }
}

/// Cancellation fired by Ctrl-C. A second Ctrl-C exits the process.
///
/// Cancellation is ignored while a deployment drains blue, so the second press is the way out;
/// the persisted record lets `resume` pick the deployment up again.
pub fn cancel_on_ctrl_c() -> Cancellation {
    let handle = CancelHandle::new();
    let token = handle.token();
    let presses = futures::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    tokio::spawn(watch_interrupts(presses, handle, || {
        eprintln!(
            "Interrupted again, exiting. Deployment state is saved; \
             find the execution with `blueshift status` and continue it with `blueshift resume <id> --force`."
        );
        std::process::exit(130);
    }));
    token
}

async fn watch_interrupts<S, F>(presses: S, handle: CancelHandle, abort: F)
where
    S: Stream<Item = ()>,
    F: FnOnce(),
{
    let mut presses = std::pin::pin!(presses);
    if presses.next().await.is_none() {
        return;
    }
    tracing::warn!("interrupt received, cancelling execution (press Ctrl-C again to exit)");
    handle.cancel();

    if presses.next().await.is_some() {
        abort();
    }
}
