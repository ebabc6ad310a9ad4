// ABOUTME: Container image reference carried by build artifacts and task sets.
// ABOUTME: Accepts name, name:tag, host[:port]/path:tag and any of those pinned with @digest.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_TAG: &str = "latest";
const MAX_TAG_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// Reference to a container image produced by the build stage.
///
/// A reference without tag or digest is normalised to `:latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

fn allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '-' | '_' | '@')
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.len() <= MAX_TAG_LEN && !tag.contains(['/', ':', '@'])
}

/// The first path component is a registry host when it looks like one.
fn is_registry_host(component: &str) -> bool {
    component == "localhost" || component.contains(['.', ':'])
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }
        if let Some(bad) = input.chars().find(|c| !allowed(*c)) {
            return Err(ParseImageRefError::InvalidChar(bad));
        }
        let malformed = || ParseImageRefError::InvalidFormat(input.to_string());

        let (rest, digest) = match input.split_once('@') {
            Some((_, "")) => return Err(malformed()),
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (input, None),
        };

        // Only a colon in the last path component introduces a tag; earlier ones are ports.
        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (path, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => {
                let tag = &rest[last_slash + i + 1..];
                if !is_valid_tag(tag) {
                    return Err(malformed());
                }
                (&rest[..last_slash + i], Some(tag.to_string()))
            }
            None => (rest, None),
        };

        if path.is_empty() || path.starts_with('/') || path.ends_with('/') || path.contains("//") {
            return Err(malformed());
        }

        let (registry, name) = match path.split_once('/') {
            Some((host, name)) if is_registry_host(host) => (Some(host.to_string()), name),
            _ => (None, path),
        };

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(Self {
            registry,
            name: name.to_string(),
            tag,
            digest,
        })
    }

    /// Same repository with a different tag; any digest is dropped.
    pub fn with_tag(&self, tag: &str) -> Result<Self, ParseImageRefError> {
        if let Some(bad) = tag.chars().find(|c| !allowed(*c)) {
            return Err(ParseImageRefError::InvalidChar(bad));
        }
        if !is_valid_tag(tag) {
            return Err(ParseImageRefError::InvalidFormat(tag.to_string()));
        }
        Ok(Self {
            registry: self.registry.clone(),
            name: self.name.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        })
    }

    /// Registry and name without tag or digest.
    pub fn repository(&self) -> String {
        match &self.registry {
            Some(host) => format!("{host}/{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
