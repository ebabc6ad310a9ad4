// ABOUTME: Per-target deploy lock so executions against the same target queue instead of overlapping.
// ABOUTME: A create_new file in the state directory holds the owner as JSON; the owner heartbeats it while deploying.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use super::DeployError;
use super::settings::LockSettings;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How often a holder refreshes `heartbeat_at`.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// A lock whose last heartbeat is older than this was abandoned by a crashed process.
const STALE_AFTER_HOURS: i64 = 1;

/// Who holds a deploy lock, as written into the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub target: String,
    /// Distinguishes this acquisition from a later one by the same process.
    #[serde(default)]
    pub lease: String,
    /// Last time the holder proved it was alive; `started_at` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl LockInfo {
    /// Owner record for this process.
    pub fn new(target: &str) -> Self {
        let now = Utc::now();
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: now,
            target: target.to_string(),
            lease: uuid::Uuid::new_v4().simple().to_string(),
            heartbeat_at: Some(now),
        }
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.heartbeat_at.unwrap_or(self.started_at)
    }

    /// Judged by the last heartbeat, so a long deployment keeps its lock.
    pub fn is_stale(&self) -> bool {
        (Utc::now() - self.last_seen()).num_hours() >= STALE_AFTER_HOURS
    }

    /// `<dir>/<target>.lock`, with anything outside `[A-Za-z0-9_-]` replaced by `_`.
    pub fn lock_path(dir: &Path, target: &str) -> PathBuf {
        let stem: String = target
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        dir.join(stem).with_extension("lock")
    }
}

/// What stood in the way of creating the lock file.
enum Contention {
    /// Someone else holds it and it should be respected.
    Live(LockInfo),
    /// It can be removed and the create retried.
    Breakable,
    /// It was released between the create and the read.
    Gone,
}

/// A held deploy lock. Released explicitly, or on drop as a fallback.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    target: String,
    lease: String,
    heartbeat: JoinHandle<()>,
    released: bool,
}

impl DeployLock {
    /// Take the lock for `target`, polling until it frees up or `settings.timeout` passes.
    ///
    /// Stale locks are always broken; live ones only when `settings.force` is set.
    pub async fn acquire(settings: &LockSettings, target: &str) -> Result<Self, DeployError> {
        tokio::fs::create_dir_all(&settings.dir).await.map_err(|e| {
            DeployError::lock_error(format!("cannot create {}: {e}", settings.dir.display()))
        })?;

        let path = LockInfo::lock_path(&settings.dir, target);
        let give_up_at = tokio::time::Instant::now() + settings.timeout;
        let mut announced = false;

        loop {
            let mine = LockInfo::new(target);
            if create_lock_file(&path, &mine).await? {
                tracing::debug!(target_name = target, path = %path.display(), "deploy lock acquired");
                return Ok(Self {
                    heartbeat: spawn_heartbeat(path.clone(), mine.lease.clone()),
                    path,
                    target: target.to_string(),
                    lease: mine.lease,
                    released: false,
                });
            }

            let holder = match inspect(&path, settings.force).await? {
                Contention::Gone => continue,
                Contention::Breakable => {
                    if let Err(e) = tokio::fs::remove_file(&path).await
                        && e.kind() != ErrorKind::NotFound
                    {
                        return Err(DeployError::lock_error(format!(
                            "cannot break lock {}: {e}",
                            path.display()
                        )));
                    }
                    continue;
                }
                Contention::Live(holder) => holder,
            };

            if tokio::time::Instant::now() >= give_up_at {
                return Err(DeployError::LockHeld {
                    target: target.to_string(),
                    holder: holder.holder,
                    pid: holder.pid,
                    started_at: holder.started_at,
                });
            }
            if !announced {
                tracing::info!(
                    target_name = target,
                    holder = %holder.holder,
                    pid = holder.pid,
                    "waiting for deploy lock"
                );
                announced = true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Refresh `heartbeat_at`. `Ok(false)` when the lock was broken and now belongs to someone else.
    pub async fn heartbeat(&self) -> Result<bool, DeployError> {
        refresh(&self.path, &self.lease).await
    }

    /// Remove the lock file. A file someone else already removed counts as released.
    pub async fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        self.heartbeat.abort();
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(DeployError::lock_error(format!(
                "cannot remove lock file {}: {e}",
                self.path.display()
            ))),
            _ => Ok(()),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        self.heartbeat.abort();
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn spawn_heartbeat(path: PathBuf, lease: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately.
        ticks.tick().await;
        loop {
            ticks.tick().await;
            match refresh(&path, &lease).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(path = %path.display(), "deploy lock was taken over, heartbeat stopped");
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "failed to refresh deploy lock"),
            }
        }
    })
}

/// Rewrite the lock with a fresh heartbeat if `lease` still owns it.
async fn refresh(path: &Path, lease: &str) -> Result<bool, DeployError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(DeployError::lock_error(format!("cannot read lock info: {e}"))),
    };
    let Ok(mut info) = serde_json::from_slice::<LockInfo>(&raw) else {
        return Ok(false);
    };
    if info.lease != lease {
        return Ok(false);
    }

    info.heartbeat_at = Some(Utc::now());
    let body = serde_json::to_vec(&info)
        .map_err(|e| DeployError::lock_error(format!("cannot encode lock info: {e}")))?;
    // Readers only ever see the old or the new record.
    let staging = path.with_extension("lock.heartbeat");
    tokio::fs::write(&staging, &body)
        .await
        .map_err(|e| DeployError::lock_error(format!("cannot write heartbeat: {e}")))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| DeployError::lock_error(format!("cannot install heartbeat: {e}")))?;
    Ok(true)
}

/// `Ok(false)` when the file already exists.
async fn create_lock_file(path: &Path, info: &LockInfo) -> Result<bool, DeployError> {
    let body = serde_json::to_vec(info)
        .map_err(|e| DeployError::lock_error(format!("cannot encode lock info: {e}")))?;

    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(DeployError::lock_error(format!("cannot create lock: {e}"))),
    };
    let written = match file.write_all(&body).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    written.map_err(|e| DeployError::lock_error(format!("cannot write lock info: {e}")))?;
    Ok(true)
}

async fn inspect(path: &Path, force: bool) -> Result<Contention, DeployError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Contention::Gone),
        Err(e) => return Err(DeployError::lock_error(format!("cannot read lock info: {e}"))),
    };

    // An empty file means the holder has not finished writing it yet.
    if raw.is_empty() {
        return Ok(Contention::Live(LockInfo::new("unknown")));
    }
    let Ok(existing) = serde_json::from_slice::<LockInfo>(&raw) else {
        tracing::warn!(path = %path.display(), "lock file unreadable, breaking it");
        return Ok(Contention::Breakable);
    };

    if force || existing.is_stale() {
        tracing::warn!(
            holder = %existing.holder,
            pid = existing.pid,
            since = %existing.started_at,
            forced = force,
            "breaking deploy lock"
        );
        return Ok(Contention::Breakable);
    }
    Ok(Contention::Live(existing))
}
