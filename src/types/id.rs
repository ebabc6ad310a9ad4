// ABOUTME: Phantom-typed identifiers for artifacts, executions, deployments, and task sets.
// ABOUTME: Each kind carries a prefix so generated ids are recognisable in logs and state files.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The kind of thing an [`Id`] names.
pub trait IdKind {
    /// Prefix of generated ids, e.g. `exec` in `exec-3f2a...`.
    const PREFIX: &'static str;
    /// Type name shown in `Debug` output.
    const NAME: &'static str;
}

macro_rules! id_kind {
    ($(#[$meta:meta])* $marker:ident, $alias:ident, $prefix:literal) => {
        $(#[$meta])*
        pub enum $marker {}

        impl IdKind for $marker {
            const PREFIX: &'static str = $prefix;
            const NAME: &'static str = stringify!($alias);
        }

        pub type $alias = Id<$marker>;
    };
}

id_kind!(ArtifactMarker, ArtifactId, "art");
id_kind!(ExecutionMarker, ExecutionId, "exec");
id_kind!(DeploymentMarker, DeploymentId, "dep");
/// Task set ids come from the target, so they are rarely generated locally.
id_kind!(TaskSetMarker, TaskSetId, "ts");

/// A string identifier that cannot be mixed up with an id of another kind.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<K> {
    value: String,
    _kind: PhantomData<K>,
}

impl<K: IdKind> Id<K> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _kind: PhantomData,
        }
    }

    /// Fresh random id with this kind's prefix.
    pub fn generate() -> Self {
        Self::new(format!("{}-{}", K::PREFIX, uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// The marker is never instantiated, so none of these may bound on K.

impl<K: IdKind> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(K::NAME).field(&self.value).finish()
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K> Eq for Id<K> {}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}
