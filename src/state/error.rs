// ABOUTME: State store error types with SNAFU context selectors.
// ABOUTME: Every variant carries the path or record involved.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StateError {
    #[snafu(display("failed to create state directory {}: {source}", path.display()))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write state file {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to read state file {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to encode {kind} record {id}: {source}"))]
    Encode {
        kind: &'static str,
        id: String,
        source: serde_json::Error,
    },

    #[snafu(display("corrupt state file {}: {source}", path.display()))]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("invalid record id: {id:?}"))]
    InvalidId { id: String },
}
