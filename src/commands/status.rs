// ABOUTME: Status command implementation.
// ABOUTME: Lists recorded executions or shows one execution and its deployment.

use blueshift::error::{Error, Result};
use blueshift::output::{Output, OutputMode};
use blueshift::state::{FileStateStore, StateStore};
use blueshift::types::ExecutionId;

use super::release::load_settings;

pub async fn status(execution_id: Option<String>, output: Output) -> Result<()> {
    let settings = load_settings()?;
    let store = FileStateStore::open(&settings.state_dir).await?;

    let Some(id) = execution_id else {
        let executions = store.list_executions().await?;
        if executions.is_empty() {
            output.progress("No executions recorded");
        }
        for record in &executions {
            output.json_line(record);
            if output.mode() != OutputMode::Json {
                println!(
                    "{}  {:<9}  {}  {}",
                    record.id,
                    record.status,
                    record.started_at.format("%Y-%m-%d %H:%M:%S"),
                    record.trigger.reason
                );
            }
        }
        return Ok(());
    };

    let id = ExecutionId::new(id);
    let record = store
        .load_execution(&id)
        .await?
        .ok_or_else(|| Error::ExecutionNotFound(id.clone()))?;
    let deployment = store
        .list_deployments()
        .await?
        .into_iter()
        .rev()
        .find(|d| d.execution_id.as_ref() == Some(&id));

    if output.mode() == OutputMode::Json {
        output.json_line(&record);
        if let Some(deployment) = &deployment {
            output.json_line(deployment);
        }
        return Ok(());
    }

    println!("Execution {} ({})", record.id, record.pipeline);
    println!("  status:  {}", record.status);
    for stage in &record.stages {
        match &stage.cause {
            Some(cause) => println!("  {:<8} {} - {}", stage.name, stage.status, cause),
            None => println!("  {:<8} {}", stage.name, stage.status),
        }
    }
    if let Some(deployment) = deployment {
        println!("Deployment {}", deployment.id);
        println!("  state:   {}", deployment.state);
        println!("  split:   {}", deployment.split());
        if let Some(reason) = &deployment.stuck {
            println!("  stuck:   {}", reason);
        }
    }
    Ok(())
}
