// ABOUTME: Blue/green release of a container image to an execution target.
// ABOUTME: Exports the state machine, the persisted deployment record, and the controller.

mod controller;
mod deployment;
mod error;
mod lock;
mod rollback;
mod settings;
mod state;

pub use controller::{BlueGreenController, DeployRequest};
pub use deployment::{Deployment, TaskSet};
pub use error::{DeployError, DeployErrorKind};
pub use lock::{DeployLock, LockInfo};
pub use settings::{DeploySettings, HealthSettings, LockSettings, TerminationRetry};
pub use state::{DeployState, InvalidTransition, RollbackCause, Signal};
