// ABOUTME: Validated names for pipelines, stages, and artifacts.
// ABOUTME: Pipeline names follow RFC 1123 labels; stage and artifact names are identifier-like.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("{kind} name cannot be empty")]
    Empty { kind: &'static str },

    #[error("{kind} name exceeds maximum length of 63 characters")]
    TooLong { kind: &'static str },

    #[error("{kind} name cannot start or end with a hyphen")]
    EdgeHyphen { kind: &'static str },

    #[error("{kind} name must be lowercase")]
    NotLowercase { kind: &'static str },

    #[error("invalid character in {kind} name: '{ch}'")]
    InvalidChar { kind: &'static str, ch: char },
}

fn check_common(value: &str, kind: &'static str) -> Result<(), NameError> {
    if value.is_empty() {
        return Err(NameError::Empty { kind });
    }
    if value.len() > MAX_LEN {
        return Err(NameError::TooLong { kind });
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(NameError::EdgeHyphen { kind });
    }
    Ok(())
}

/// DNS-label-compatible pipeline name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineName(String);

impl PipelineName {
    pub fn new(value: &str) -> Result<Self, NameError> {
        const KIND: &str = "pipeline";
        check_common(value, KIND)?;

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(NameError::NotLowercase { kind: KIND });
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(NameError::InvalidChar { kind: KIND, ch: c });
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! identifier_name {
    ($(#[$meta:meta])* $ty:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $ty(String);

        impl $ty {
            pub fn new(value: &str) -> Result<Self, NameError> {
                check_common(value, $kind)?;
                if let Some(ch) = value
                    .chars()
                    .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
                {
                    return Err(NameError::InvalidChar { kind: $kind, ch });
                }
                Ok(Self(value.to_string()))
            }

            /// For names fixed at compile time; covered by tests rather than checked.
            pub(crate) fn from_static(value: &'static str) -> Self {
                Self(value.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::new(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

identifier_name!(
    /// Name of a stage, unique within a pipeline.
    StageName,
    "stage"
);

identifier_name!(
    /// Name under which a stage declares an input or output artifact.
    ArtifactName,
    "artifact"
);

impl fmt::Display for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PipelineName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
