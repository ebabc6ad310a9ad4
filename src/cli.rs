// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blueshift")]
#[command(about = "Source-to-cluster release pipeline with blue/green traffic shifting")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new blueshift.yml configuration file
    Init {
        /// Pipeline name
        #[arg(short, long)]
        pipeline: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Check the configuration and pipeline wiring
    Validate,

    /// Print the traffic-shift schedule
    Plan,

    /// Run the release pipeline
    Run {
        /// Pin the checkout to this revision
        #[arg(short, long)]
        revision: Option<String>,

        /// Break a deploy lock held by another execution
        #[arg(short, long)]
        force: bool,
    },

    /// Continue an interrupted or stuck execution
    Resume {
        execution_id: String,

        /// Break a deploy lock held by another execution
        #[arg(short, long)]
        force: bool,
    },

    /// Show executions, or one execution in detail
    Status { execution_id: Option<String> },
}
