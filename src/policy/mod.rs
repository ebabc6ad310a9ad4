// ABOUTME: Traffic-shift policies governing how fast traffic moves to the green task set.
// ABOUTME: Linear, canary, and all-at-once schedules with a pure next-weight evaluator.

mod named;

pub use named::DeploymentConfigName;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::Weight;

/// Shape of a traffic-shift schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShiftKind {
    /// Add `step` percent every `interval` until 100.
    Linear,
    /// Shift `step` percent, hold for `bake_time`, then shift to 100.
    Canary,
    /// Shift straight to 100.
    AllAtOnce,
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftKind::Linear => write!(f, "linear"),
            ShiftKind::Canary => write!(f, "canary"),
            ShiftKind::AllAtOnce => write!(f, "all-at-once"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("step percentage must be in (0, 100], got {0}")]
    InvalidStep(u16),

    #[error("linear policy needs a non-zero step interval")]
    ZeroInterval,

    #[error("canary policy needs a bake time")]
    MissingBakeTime,
}

/// A validated traffic-shift policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct TrafficShiftPolicy {
    kind: ShiftKind,
    step: Weight,
    interval: Duration,
    bake_time: Duration,
}

impl TrafficShiftPolicy {
    pub fn linear(step: u16, interval: Duration) -> Result<Self, PolicyError> {
        let step = validate_step(step)?;
        if interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        Ok(Self {
            kind: ShiftKind::Linear,
            step,
            interval,
            bake_time: Duration::ZERO,
        })
    }

    pub fn canary(step: u16, bake_time: Duration) -> Result<Self, PolicyError> {
        let step = validate_step(step)?;
        Ok(Self {
            kind: ShiftKind::Canary,
            step,
            interval: Duration::ZERO,
            bake_time,
        })
    }

    /// Equivalent to a single step of 100% with zero interval.
    pub fn all_at_once() -> Self {
        Self {
            kind: ShiftKind::AllAtOnce,
            step: Weight::FULL,
            interval: Duration::ZERO,
            bake_time: Duration::ZERO,
        }
    }

    pub fn kind(&self) -> ShiftKind {
        self.kind
    }

    pub fn step(&self) -> Weight {
        self.step
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn bake_time(&self) -> Duration {
        self.bake_time
    }

    /// Weight green should carry next.
    ///
    /// `since_last_shift` is `None` before the first shift of a deployment,
    /// which makes the first step immediate for every policy kind.
    pub fn next_weight(&self, since_last_shift: Option<Duration>, current: Weight) -> Weight {
        if current.is_full() {
            return current;
        }

        match self.kind {
            ShiftKind::AllAtOnce => Weight::FULL,
            ShiftKind::Linear => match since_last_shift {
                Some(elapsed) if elapsed < self.interval => current,
                _ => current.step_up(self.step),
            },
            ShiftKind::Canary => {
                if current == Weight::ZERO {
                    return self.step;
                }
                match since_last_shift {
                    Some(elapsed) if elapsed < self.bake_time => current,
                    _ => Weight::FULL,
                }
            }
        }
    }

    /// How long to hold before `next_weight` will move traffic again.
    pub fn hold_remaining(&self, since_last_shift: Option<Duration>, current: Weight) -> Duration {
        let Some(elapsed) = since_last_shift else {
            return Duration::ZERO;
        };
        if current.is_full() {
            return Duration::ZERO;
        }

        match self.kind {
            ShiftKind::AllAtOnce => Duration::ZERO,
            ShiftKind::Linear => self.interval.saturating_sub(elapsed),
            ShiftKind::Canary if current == Weight::ZERO => Duration::ZERO,
            ShiftKind::Canary => self.bake_time.saturating_sub(elapsed),
        }
    }

    /// The planned shifts from 0 to 100, with offsets from the first shift.
    pub fn schedule(&self) -> Vec<PlannedShift> {
        let mut shifts = Vec::new();
        let mut current = Weight::ZERO;
        let mut offset = Duration::ZERO;
        let mut since_last: Option<Duration> = None;

        while !current.is_full() {
            let hold = self.hold_remaining(since_last, current);
            offset += hold;
            let next = self.next_weight(since_last.map(|s| s + hold), current);
            if next == current {
                break;
            }
            shifts.push(PlannedShift {
                offset,
                weight: next,
            });
            current = next;
            since_last = Some(Duration::ZERO);
        }

        shifts
    }

    /// Time from the first shift until green carries all traffic.
    pub fn total_duration(&self) -> Duration {
        self.schedule()
            .last()
            .map(|s| s.offset)
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for TrafficShiftPolicy {
    fn default() -> Self {
        DeploymentConfigName::default().policy()
    }
}

impl fmt::Display for TrafficShiftPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ShiftKind::Linear => write!(
                f,
                "linear {} every {}",
                self.step,
                humantime_serde::re::humantime::format_duration(self.interval)
            ),
            ShiftKind::Canary => write!(
                f,
                "canary {} for {}",
                self.step,
                humantime_serde::re::humantime::format_duration(self.bake_time)
            ),
            ShiftKind::AllAtOnce => write!(f, "all-at-once"),
        }
    }
}

fn validate_step(step: u16) -> Result<Weight, PolicyError> {
    if step == 0 || step > 100 {
        return Err(PolicyError::InvalidStep(step));
    }
    Weight::new(step).map_err(|_| PolicyError::InvalidStep(step))
}

/// One planned weight change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedShift {
    /// Offset from the first shift.
    #[serde(with = "humantime_serde")]
    pub offset: Duration,
    /// Green weight after the shift.
    pub weight: Weight,
}

/// Serialized form of a policy, as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPolicy {
    kind: ShiftKind,
    #[serde(default)]
    step: Option<u16>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    interval: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    bake_time: Option<Duration>,
}

impl TryFrom<RawPolicy> for TrafficShiftPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        match raw.kind {
            ShiftKind::AllAtOnce => Ok(TrafficShiftPolicy::all_at_once()),
            ShiftKind::Linear => TrafficShiftPolicy::linear(
                raw.step.unwrap_or(0),
                raw.interval.unwrap_or(Duration::ZERO),
            ),
            ShiftKind::Canary => TrafficShiftPolicy::canary(
                raw.step.unwrap_or(0),
                raw.bake_time.ok_or(PolicyError::MissingBakeTime)?,
            ),
        }
    }
}

impl From<TrafficShiftPolicy> for RawPolicy {
    fn from(policy: TrafficShiftPolicy) -> Self {
        RawPolicy {
            kind: policy.kind,
            step: Some(policy.step.get() as u16),
            interval: (policy.kind == ShiftKind::Linear).then_some(policy.interval),
            bake_time: (policy.kind == ShiftKind::Canary).then_some(policy.bake_time),
        }
    }
}
