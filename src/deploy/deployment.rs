// ABOUTME: Persisted record of one blue/green deployment.
// ABOUTME: Holds both task sets, the current state, and the weights observed along the way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{DeployState, InvalidTransition, Signal};
use crate::ops::{ExecutionTarget, HealthStatus, PrimaryTaskSet, Slot};
use crate::policy::TrafficShiftPolicy;
use crate::types::{DeploymentId, ExecutionId, ImageRef, TaskSetId, TrafficSplit, Weight};

/// One side of a blue/green deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSet {
    pub id: TaskSetId,
    pub slot: Slot,
    pub image: ImageRef,
    pub desired_weight: Weight,
    pub actual_weight: Weight,
    #[serde(default)]
    pub health: Option<HealthStatus>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub termination_deadline: Option<DateTime<Utc>>,
}

impl TaskSet {
    /// The pre-existing primary, carrying all traffic.
    pub fn blue(primary: PrimaryTaskSet) -> Self {
        Self {
            id: primary.id,
            slot: Slot::Blue,
            image: primary.image,
            desired_weight: Weight::FULL,
            actual_weight: Weight::FULL,
            health: None,
            created_at: Utc::now(),
            termination_deadline: None,
        }
    }

    /// A freshly created replacement receiving no traffic.
    pub fn green(id: TaskSetId, image: ImageRef) -> Self {
        Self {
            id,
            slot: Slot::Green,
            image,
            desired_weight: Weight::ZERO,
            actual_weight: Weight::ZERO,
            health: None,
            created_at: Utc::now(),
            termination_deadline: None,
        }
    }
}

/// A blue/green deployment and everything needed to resume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    pub target: ExecutionTarget,
    pub image: ImageRef,
    pub policy: TrafficShiftPolicy,
    pub state: DeployState,
    #[serde(default)]
    pub blue: Option<TaskSet>,
    #[serde(default)]
    pub green: Option<TaskSet>,
    /// Green's weight at every health observation, starting at provisioning.
    #[serde(default)]
    pub weight_history: Vec<Weight>,
    #[serde(default)]
    pub last_shift_at: Option<DateTime<Utc>>,
    /// Set while the old task set cannot be terminated.
    #[serde(default)]
    pub stuck: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(
        execution_id: Option<ExecutionId>,
        target: ExecutionTarget,
        image: ImageRef,
        policy: TrafficShiftPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::generate(),
            execution_id,
            target,
            image,
            policy,
            state: DeployState::Provisioning,
            blue: None,
            green: None,
            weight_history: Vec::new(),
            last_shift_at: None,
            stuck: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to the next state, or leave the record untouched on an invalid signal.
    pub fn apply(&mut self, signal: Signal) -> Result<&DeployState, InvalidTransition> {
        let next = self.state.next(signal)?;
        tracing::info!(
            deployment = %self.id,
            from = self.state.name(),
            to = next.name(),
            "deployment state transition"
        );
        self.state = next;
        self.updated_at = Utc::now();
        Ok(&self.state)
    }

    /// Green's current share of traffic, zero before green exists.
    pub fn green_weight(&self) -> Weight {
        self.green
            .as_ref()
            .map(|g| g.actual_weight)
            .unwrap_or(Weight::ZERO)
    }

    /// The traffic split as last applied.
    pub fn split(&self) -> TrafficSplit {
        TrafficSplit::with_green(self.green_weight())
    }

    /// Record a weight change that the target has accepted.
    pub(crate) fn record_split(&mut self, split: TrafficSplit) {
        if let Some(green) = self.green.as_mut() {
            green.desired_weight = split.green();
            green.actual_weight = split.green();
        }
        if let Some(blue) = self.blue.as_mut() {
            blue.desired_weight = split.blue();
            blue.actual_weight = split.blue();
        }
        self.updated_at = Utc::now();
    }

    pub(crate) fn record_health(&mut self, status: HealthStatus) {
        let weight = self.green_weight();
        if let Some(green) = self.green.as_mut() {
            green.health = Some(status);
        }
        self.weight_history.push(weight);
        self.updated_at = Utc::now();
    }

    pub fn is_first_deployment(&self) -> bool {
        self.blue.is_none()
    }

    pub fn is_stuck(&self) -> bool {
        self.stuck.is_some()
    }
}
