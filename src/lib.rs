// ABOUTME: Library root for blueshift - a source-to-cluster release pipeline.
// ABOUTME: The CLI binary lives in main.rs; everything it drives is exported here.

pub mod artifact;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod ops;
pub mod output;
pub mod pipeline;
pub mod policy;
pub mod state;
pub mod types;
