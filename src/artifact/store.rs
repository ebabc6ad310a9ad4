// ABOUTME: Append-only artifact stores keyed by unique artifact id.
// ABOUTME: In-memory store for tests and single-process runs, file store for durable runs.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Artifact, ArtifactContent};
use crate::types::{ArtifactId, ArtifactName};

/// Errors from artifact store operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(ArtifactId),

    #[error("artifact already exists: {0}")]
    AlreadyExists(ArtifactId),

    #[error("artifact store I/O error for {id}: {source}")]
    Io {
        id: ArtifactId,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt artifact record {id}: {source}")]
    Corrupt {
        id: ArtifactId,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable record of artifacts until they are explicitly released.
///
/// Writes only ever add new ids; an existing entry is never replaced, so
/// readers never contend with writers on the same entry.
pub trait ArtifactStore: Send + Sync {
    /// Record a new artifact produced by `producer`.
    fn put(
        &self,
        producer: &str,
        name: ArtifactName,
        content: ArtifactContent,
    ) -> Result<Artifact, ArtifactError>;

    /// Look up an artifact by id.
    fn get(&self, id: &ArtifactId) -> Result<Artifact, ArtifactError>;

    /// Drop an artifact. Releasing an unknown id is not an error.
    fn release(&self, id: &ArtifactId) -> Result<(), ArtifactError>;
}

/// Process-local artifact store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<ArtifactId, Artifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts currently held.
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(
        &self,
        producer: &str,
        name: ArtifactName,
        content: ArtifactContent,
    ) -> Result<Artifact, ArtifactError> {
        let artifact = Artifact::new(producer, name, content);
        let mut artifacts = self.artifacts.write();
        if artifacts.contains_key(artifact.id()) {
            return Err(ArtifactError::AlreadyExists(artifact.id().clone()));
        }
        artifacts.insert(artifact.id().clone(), artifact.clone());
        Ok(artifact)
    }

    fn get(&self, id: &ArtifactId) -> Result<Artifact, ArtifactError> {
        self.artifacts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(id.clone()))
    }

    fn release(&self, id: &ArtifactId) -> Result<(), ArtifactError> {
        self.artifacts.write().remove(id);
        Ok(())
    }
}

/// Artifact store writing one JSON file per artifact.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn put(
        &self,
        producer: &str,
        name: ArtifactName,
        content: ArtifactContent,
    ) -> Result<Artifact, ArtifactError> {
        let artifact = Artifact::new(producer, name, content);
        let id = artifact.id().clone();
        let json = serde_json::to_vec_pretty(&artifact).map_err(|source| ArtifactError::Corrupt {
            id: id.clone(),
            source,
        })?;

        // create_new fails if the file exists, keeping the store append-only
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(&id))
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ArtifactError::AlreadyExists(id));
            }
            Err(source) => return Err(ArtifactError::Io { id, source }),
        };
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|source| ArtifactError::Io {
                id: id.clone(),
                source,
            })?;

        Ok(artifact)
    }

    fn get(&self, id: &ArtifactId) -> Result<Artifact, ArtifactError> {
        let bytes = match fs::read(self.path_for(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(id.clone()));
            }
            Err(source) => {
                return Err(ArtifactError::Io {
                    id: id.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Corrupt {
            id: id.clone(),
            source,
        })
    }

    fn release(&self, id: &ArtifactId) -> Result<(), ArtifactError> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io {
                id: id.clone(),
                source,
            }),
        }
    }
}
