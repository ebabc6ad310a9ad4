// ABOUTME: File-backed state store writing one JSON document per record.
// ABOUTME: Writes go to a temp file that is renamed into place, so readers never see partial records.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

use super::error::{
    CreateDirSnafu, DecodeSnafu, EncodeSnafu, InvalidIdSnafu, ReadSnafu, WriteSnafu,
};
use super::{StateError, StateStore};
use crate::deploy::Deployment;
use crate::pipeline::ExecutionRecord;
use crate::types::{DeploymentId, ExecutionId};

const EXECUTIONS_DIR: &str = "executions";
const DEPLOYMENTS_DIR: &str = "deployments";

/// State store rooted at a directory:
///
/// ```text
/// <root>/executions/<execution-id>.json
/// <root>/deployments/<deployment-id>.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StateError> {
        let root = root.into();
        for sub in [EXECUTIONS_DIR, DEPLOYMENTS_DIR] {
            let path = root.join(sub);
            tokio::fs::create_dir_all(&path)
                .await
                .context(CreateDirSnafu { path: &path })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, sub: &str, id: &str) -> Result<PathBuf, StateError> {
        // Ids from the command line must not escape the state directory.
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return InvalidIdSnafu { id }.fail();
        }
        Ok(self.root.join(sub).join(format!("{}.json", id)))
    }

    async fn write<T: Serialize>(
        &self,
        sub: &str,
        kind: &'static str,
        id: &str,
        value: &T,
    ) -> Result<(), StateError> {
        let path = self.record_path(sub, id)?;
        let json = serde_json::to_vec_pretty(value).context(EncodeSnafu { kind, id })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .context(WriteSnafu { path: &tmp })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .context(WriteSnafu { path: &path })?;

        tracing::trace!(path = %path.display(), "state record written");
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StateError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(ReadSnafu { path }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .context(DecodeSnafu { path })
    }

    async fn read_all<T: DeserializeOwned>(&self, sub: &str) -> Result<Vec<T>, StateError> {
        let dir = self.root.join(sub);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .context(ReadSnafu { path: &dir })?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context(ReadSnafu { path: &dir })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = self.read(&path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), StateError> {
        self.write(EXECUTIONS_DIR, "execution", record.id.as_str(), record)
            .await
    }

    async fn load_execution(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<ExecutionRecord>, StateError> {
        let path = self.record_path(EXECUTIONS_DIR, id.as_str())?;
        self.read(&path).await
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionRecord>, StateError> {
        let mut records: Vec<ExecutionRecord> = self.read_all(EXECUTIONS_DIR).await?;
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }

    async fn save_deployment(&self, deployment: &Deployment) -> Result<(), StateError> {
        self.write(
            DEPLOYMENTS_DIR,
            "deployment",
            deployment.id.as_str(),
            deployment,
        )
        .await
    }

    async fn load_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, StateError> {
        let path = self.record_path(DEPLOYMENTS_DIR, id.as_str())?;
        self.read(&path).await
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, StateError> {
        let mut records: Vec<Deployment> = self.read_all(DEPLOYMENTS_DIR).await?;
        records.sort_by_key(|d| d.created_at);
        Ok(records)
    }
}
