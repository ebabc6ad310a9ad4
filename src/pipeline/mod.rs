// ABOUTME: Pipeline definitions, the stage engine, and the orchestrator that runs executions.
// ABOUTME: Also hosts the standard Source -> Build -> Deploy stages.

mod cancel;
mod definition;
mod engine;
mod event;
mod orchestrator;
mod record;
mod result;
pub mod stages;
mod trigger;

pub use cancel::{CancelHandle, Cancellation};
pub use definition::{PipelineBuilder, PipelineDef, StageDef, WiringError};
pub use engine::{StageContext, StageEngine, StageExecutor, StageOutputs};
pub use event::PipelineEvent;
pub use orchestrator::{Orchestrator, PipelineError};
pub use record::{ExecutionRecord, ExecutionStatus, FailureRecord, StageRecord, StageStatus};
pub use result::{FailureKind, PipelineResult, StageFailure, StageResult};
pub use stages::{BuildStage, DeployStage, SourceStage, release_pipeline};
pub use trigger::{Trigger, TriggerInfo};
