// ABOUTME: The fixed set of named deployment configurations.
// ABOUTME: Maps each configuration name onto its traffic-shift policy.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::{ShiftKind, TrafficShiftPolicy};
use crate::types::Weight;

/// Prefix used by managed deployment services for the same configuration names.
const MANAGED_PREFIX: &str = "CodeDeployDefault.ECS";

/// Named deployment configuration, selecting a traffic-shift policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeploymentConfigName {
    #[default]
    Linear10PercentEvery1Minutes,
    Linear10PercentEvery3Minutes,
    Canary10Percent5Minutes,
    Canary10Percent15Minutes,
    AllAtOnce,
}

impl DeploymentConfigName {
    pub const ALL: [DeploymentConfigName; 5] = [
        DeploymentConfigName::Linear10PercentEvery1Minutes,
        DeploymentConfigName::Linear10PercentEvery3Minutes,
        DeploymentConfigName::Canary10Percent5Minutes,
        DeploymentConfigName::Canary10Percent15Minutes,
        DeploymentConfigName::AllAtOnce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentConfigName::Linear10PercentEvery1Minutes => "Linear10PercentEvery1Minutes",
            DeploymentConfigName::Linear10PercentEvery3Minutes => "Linear10PercentEvery3Minutes",
            DeploymentConfigName::Canary10Percent5Minutes => "Canary10Percent5Minutes",
            DeploymentConfigName::Canary10Percent15Minutes => "Canary10Percent15Minutes",
            DeploymentConfigName::AllAtOnce => "AllAtOnce",
        }
    }

    pub fn policy(&self) -> TrafficShiftPolicy {
        const MINUTE: u64 = 60;
        let ten = Weight::saturating(10);
        let (kind, step, interval, bake) = match self {
            DeploymentConfigName::Linear10PercentEvery1Minutes => (ShiftKind::Linear, ten, MINUTE, 0),
            DeploymentConfigName::Linear10PercentEvery3Minutes => {
                (ShiftKind::Linear, ten, 3 * MINUTE, 0)
            }
            DeploymentConfigName::Canary10Percent5Minutes => (ShiftKind::Canary, ten, 0, 5 * MINUTE),
            DeploymentConfigName::Canary10Percent15Minutes => {
                (ShiftKind::Canary, ten, 0, 15 * MINUTE)
            }
            DeploymentConfigName::AllAtOnce => return TrafficShiftPolicy::all_at_once(),
        };
        TrafficShiftPolicy {
            kind,
            step,
            interval: Duration::from_secs(interval),
            bake_time: Duration::from_secs(bake),
        }
    }
}

impl fmt::Display for DeploymentConfigName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentConfigName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.trim();
        let bare = bare.strip_prefix(MANAGED_PREFIX).unwrap_or(bare);
        DeploymentConfigName::ALL
            .into_iter()
            .find(|name| name.as_str() == bare)
            .ok_or_else(|| {
                let allowed: Vec<_> = DeploymentConfigName::ALL
                    .iter()
                    .map(|n| n.as_str())
                    .collect();
                format!(
                    "unknown deployment config '{}', expected one of: {}",
                    s,
                    allowed.join(", ")
                )
            })
    }
}

impl Serialize for DeploymentConfigName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeploymentConfigName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_managed_prefix() {
        assert_eq!(
            "CodeDeployDefault.ECSCanary10Percent5Minutes"
                .parse::<DeploymentConfigName>()
                .unwrap(),
            DeploymentConfigName::Canary10Percent5Minutes
        );
        assert_eq!(
            "AllAtOnce".parse::<DeploymentConfigName>().unwrap(),
            DeploymentConfigName::AllAtOnce
        );
    }

    #[test]
    fn unknown_name_lists_allowed_values() {
        let err = "Linear50Percent".parse::<DeploymentConfigName>().unwrap_err();
        assert!(err.contains("Linear10PercentEvery3Minutes"));
    }

    #[test]
    fn names_map_to_expected_policies() {
        let p = DeploymentConfigName::Linear10PercentEvery3Minutes.policy();
        assert_eq!(p.kind(), ShiftKind::Linear);
        assert_eq!(p.interval(), Duration::from_secs(180));

        let p = DeploymentConfigName::Canary10Percent15Minutes.policy();
        assert_eq!(p.kind(), ShiftKind::Canary);
        assert_eq!(p.bake_time(), Duration::from_secs(900));
    }
}
