// ABOUTME: Opaque handle to the compute cluster and network boundary.
// ABOUTME: Passed through to collaborators, never inspected by the orchestration core.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where task sets run. Only collaborators interpret the attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTarget {
    /// Name identifying the target; executions against the same name are serialized.
    pub name: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ExecutionTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
