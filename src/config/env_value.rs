// ABOUTME: Configuration values that may be read from the environment.
// ABOUTME: Resolved once while building ReleaseSettings, never consulted afterwards.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A literal string, or `{ env: VAR, default: ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
}

impl EnvValue {
    /// The literal, the variable's value, or its default when unset.
    pub fn resolve(&self) -> Result<String> {
        let (var, default) = match self {
            EnvValue::Literal(literal) => return Ok(literal.clone()),
            EnvValue::FromEnv { var, default } => (var, default),
        };
        std::env::var(var)
            .ok()
            .or_else(|| default.clone())
            .ok_or_else(|| Error::MissingEnvVar(var.clone()))
    }

    /// Resolve and reject empty results, naming the config `field`.
    pub(crate) fn resolve_required(&self, field: &str) -> Result<String> {
        let value = self.resolve()?;
        if value.trim().is_empty() {
            return Err(Error::invalid_config(format!("{} must not be empty", field)));
        }
        Ok(value)
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        EnvValue::Literal(value.to_string())
    }
}

/// Resolve every value, failing on the first unset variable without a default.
pub fn resolve_env_map(map: &BTreeMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    let mut resolved = BTreeMap::new();
    for (key, value) in map {
        resolved.insert(key.clone(), value.resolve()?);
    }
    Ok(resolved)
}
