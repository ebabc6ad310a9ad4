// ABOUTME: Blue/green deployment state machine as a tagged enum.
// ABOUTME: `DeployState::next` is a pure transition function; the controller performs the side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Weight;

/// Where a deployment is in its lifecycle.
///
/// ```text
/// Provisioning -> Shifting <-> Validating -> Finalizing -> Terminated
///       \            |             |
///        +-----------+-------------+-> RollingBack -> RolledBack
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeployState {
    /// Green is being created and waits to report healthy at weight 0.
    Provisioning,
    /// Waiting for the policy to allow the next weight change, then applying it.
    Shifting,
    /// Checking green's health after a shift.
    Validating,
    /// Green carries all traffic; blue drains until `deadline`, then is destroyed.
    Finalizing { deadline: DateTime<Utc> },
    /// Restoring blue to 100 and destroying green.
    RollingBack { cause: RollbackCause },
    Terminated,
    RolledBack { cause: RollbackCause },
}

impl DeployState {
    pub fn name(&self) -> &'static str {
        match self {
            DeployState::Provisioning => "provisioning",
            DeployState::Shifting => "shifting",
            DeployState::Validating => "validating",
            DeployState::Finalizing { .. } => "finalizing",
            DeployState::RollingBack { .. } => "rolling-back",
            DeployState::Terminated => "terminated",
            DeployState::RolledBack { .. } => "rolled-back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Terminated | DeployState::RolledBack { .. })
    }

    /// States in which an unhealthy signal or cancellation triggers rollback.
    pub fn can_roll_back(&self) -> bool {
        matches!(
            self,
            DeployState::Provisioning | DeployState::Shifting | DeployState::Validating
        )
    }

    /// Apply `signal`, returning the next state.
    pub fn next(&self, signal: Signal) -> Result<DeployState, InvalidTransition> {
        let from = self.name();
        let signal_name = signal.name();

        match (self, signal) {
            (DeployState::Provisioning, Signal::GreenHealthy) => Ok(DeployState::Shifting),
            (DeployState::Shifting, Signal::Shifted) => Ok(DeployState::Validating),
            (
                DeployState::Validating,
                Signal::Healthy {
                    green_weight,
                    termination_deadline,
                },
            ) => {
                if green_weight.is_full() {
                    Ok(DeployState::Finalizing {
                        deadline: termination_deadline,
                    })
                } else {
                    Ok(DeployState::Shifting)
                }
            }
            (state, Signal::RollBack(cause)) if state.can_roll_back() => {
                Ok(DeployState::RollingBack { cause })
            }
            (DeployState::Finalizing { .. }, Signal::BlueTerminated) => Ok(DeployState::Terminated),
            (DeployState::RollingBack { cause }, Signal::GreenDestroyed) => {
                Ok(DeployState::RolledBack {
                    cause: cause.clone(),
                })
            }
            _ => Err(InvalidTransition {
                from,
                signal: signal_name,
            }),
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployState::RollingBack { cause } | DeployState::RolledBack { cause } => {
                write!(f, "{} ({})", self.name(), cause)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Events that move a deployment between states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Green registered and healthy at weight 0.
    GreenHealthy,
    /// A weight change was applied.
    Shifted,
    /// Green passed validation at `green_weight`.
    Healthy {
        green_weight: Weight,
        termination_deadline: DateTime<Utc>,
    },
    RollBack(RollbackCause),
    BlueTerminated,
    GreenDestroyed,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::GreenHealthy => "green-healthy",
            Signal::Shifted => "shifted",
            Signal::Healthy { .. } => "healthy",
            Signal::RollBack(_) => "roll-back",
            Signal::BlueTerminated => "blue-terminated",
            Signal::GreenDestroyed => "green-destroyed",
        }
    }
}

/// Why a deployment was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RollbackCause {
    /// Green failed a health check.
    Unhealthy(String),
    /// A task set operation failed before cutover.
    OperationFailed(String),
    /// The execution was cancelled.
    Cancelled,
}

impl fmt::Display for RollbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackCause::Unhealthy(reason) => write!(f, "green unhealthy: {}", reason),
            RollbackCause::OperationFailed(reason) => write!(f, "{}", reason),
            RollbackCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no transition from {from} on {signal}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub signal: &'static str,
}
