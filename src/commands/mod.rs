// ABOUTME: Command module aggregator for the blueshift CLI.
// ABOUTME: Each subcommand lives in its own module; release.rs holds the shared wiring.

mod plan;
mod release;
mod run;
mod status;
mod validate;

pub use plan::plan;
pub use run::{resume, run};
pub use status::status;
pub use validate::validate;
