// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed IDs, validated names, image references, and traffic weights.

mod id;
mod image_ref;
mod name;
mod weight;

pub use id::{ArtifactId, DeploymentId, ExecutionId, Id, IdKind, TaskSetId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use name::{ArtifactName, NameError, PipelineName, StageName};
pub use weight::{SplitError, TrafficSplit, Weight};
