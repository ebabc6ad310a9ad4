// ABOUTME: Traffic weights and blue/green traffic splits.
// ABOUTME: A split always routes exactly 100 percent of traffic across both task sets.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("weight must be between 0 and 100, got {0}")]
    OutOfRange(u16),

    #[error("blue ({blue}) and green ({green}) weights must sum to 100")]
    BadSum { blue: u8, green: u8 },
}

/// Percentage of live traffic routed to a task set (0..=100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Weight(u8);

impl Weight {
    pub const ZERO: Weight = Weight(0);
    pub const FULL: Weight = Weight(100);

    pub fn new(value: u16) -> Result<Self, SplitError> {
        if value > 100 {
            return Err(SplitError::OutOfRange(value));
        }
        Ok(Self(value as u8))
    }

    /// Build a weight, clamping anything above 100.
    pub const fn saturating(value: u8) -> Self {
        if value > 100 { Weight(100) } else { Weight(value) }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_full(self) -> bool {
        self.0 == 100
    }

    /// Add `step` percentage points, clamping at 100.
    pub fn step_up(self, step: Weight) -> Weight {
        Weight((self.0 + step.0).min(100))
    }

    /// The weight left over for the other task set.
    pub fn complement(self) -> Weight {
        Weight(100 - self.0)
    }
}

impl TryFrom<u16> for Weight {
    type Error = SplitError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Weight::new(value)
    }
}

impl From<Weight> for u16 {
    fn from(w: Weight) -> u16 {
        w.0 as u16
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Weights of the blue and green task sets at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSplit", into = "RawSplit")]
pub struct TrafficSplit {
    blue: Weight,
    green: Weight,
}

impl TrafficSplit {
    /// All traffic on the blue (primary) task set.
    pub const ALL_BLUE: TrafficSplit = TrafficSplit {
        blue: Weight::FULL,
        green: Weight::ZERO,
    };

    /// All traffic on the green (replacement) task set.
    pub const ALL_GREEN: TrafficSplit = TrafficSplit {
        blue: Weight::ZERO,
        green: Weight::FULL,
    };

    pub fn new(blue: Weight, green: Weight) -> Result<Self, SplitError> {
        if blue.get() as u16 + green.get() as u16 != 100 {
            return Err(SplitError::BadSum {
                blue: blue.get(),
                green: green.get(),
            });
        }
        Ok(Self { blue, green })
    }

    /// Split giving `green` to the green task set and the rest to blue.
    pub fn with_green(green: Weight) -> Self {
        Self {
            blue: green.complement(),
            green,
        }
    }

    pub fn blue(&self) -> Weight {
        self.blue
    }

    pub fn green(&self) -> Weight {
        self.green
    }
}

impl fmt::Display for TrafficSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blue {} / green {}", self.blue, self.green)
    }
}

#[derive(Serialize, Deserialize)]
struct RawSplit {
    blue: Weight,
    green: Weight,
}

impl TryFrom<RawSplit> for TrafficSplit {
    type Error = SplitError;

    fn try_from(raw: RawSplit) -> Result<Self, Self::Error> {
        TrafficSplit::new(raw.blue, raw.green)
    }
}

impl From<TrafficSplit> for RawSplit {
    fn from(split: TrafficSplit) -> Self {
        RawSplit {
            blue: split.blue,
            green: split.green,
        }
    }
}
