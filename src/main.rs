// ABOUTME: Entry point for the blueshift CLI application.
// ABOUTME: Parses arguments, sets up tracing, and dispatches to command handlers.

mod cli;
mod commands;

use blueshift::config;
use blueshift::error::Result;
use blueshift::output::{Output, OutputMode};
use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    if let Err(e) = run(cli.command, Output::new(mode)).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, output: Output) -> Result<()> {
    match command {
        Commands::Init { pipeline, force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, pipeline.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Validate => commands::validate(output),
        Commands::Plan => commands::plan(output),
        Commands::Run { revision, force } => commands::run(revision, force, output).await,
        Commands::Resume {
            execution_id,
            force,
        } => commands::resume(execution_id, force, output).await,
        Commands::Status { execution_id } => commands::status(execution_id, output).await,
    }
}
