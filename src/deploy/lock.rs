// ABOUTME: Deploy lock to prevent concurrent deployments to the same service across processes.
// ABOUTME: Uses atomic file creation with lock info stored under <state_dir>/locks/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::types::ServiceName;

use super::DeployError;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Service being deployed.
    pub service: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(service: &ServiceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Path to the lock file for a service.
    pub fn lock_path(lock_dir: &Path, service: &ServiceName) -> PathBuf {
        lock_dir.join(format!("{service}.lock"))
    }
}

/// A held deploy lock. Released explicitly, or on drop as a fallback.
pub struct DeployLock {
    path: PathBuf,
    service: ServiceName,
    released: bool,
}

impl std::fmt::Debug for DeployLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("service", &self.service)
            .field("path", &self.path)
            .finish()
    }
}

impl DeployLock {
    /// Acquire the deploy lock for `service`.
    ///
    /// `create_new` makes acquisition atomic. Stale locks (>1 hour) and
    /// unreadable lock files are broken with a warning; `force` breaks any.
    pub async fn acquire(
        lock_dir: &Path,
        service: &ServiceName,
        force: bool,
    ) -> Result<Self, DeployError> {
        tokio::fs::create_dir_all(lock_dir).await.map_err(|e| {
            DeployError::lock_error(format!("failed to create lock directory: {e}"))
        })?;

        let path = LockInfo::lock_path(lock_dir, service);
        let info = LockInfo::new(service);

        if Self::try_create(&path, &info).await? {
            return Ok(Self::held(path, service));
        }

        match Self::read_existing(&path).await {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(DeployError::lock_held(
                    existing.holder,
                    existing.pid,
                    existing.started_at,
                ));
            }
            Some(existing) => {
                tracing::warn!(
                    holder = %existing.holder,
                    pid = existing.pid,
                    since = %existing.started_at,
                    forced = force,
                    "breaking deploy lock"
                );
            }
            None => tracing::warn!(path = %path.display(), "lock info unreadable, breaking lock"),
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(DeployError::lock_error(format!("failed to break lock: {e}"))),
        }

        if Self::try_create(&path, &info).await? {
            Ok(Self::held(path, service))
        } else {
            Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ))
        }
    }

    fn held(path: PathBuf, service: &ServiceName) -> Self {
        Self {
            path,
            service: service.clone(),
            released: false,
        }
    }

    /// Returns false if the file already exists.
    async fn try_create(path: &Path, info: &LockInfo) -> Result<bool, DeployError> {
        let json = serde_json::to_vec(info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {e}")))?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(DeployError::lock_error(format!(
                    "failed to acquire lock: {e}"
                )));
            }
        };
        file.write_all(&json)
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to write lock: {e}")))?;
        Ok(true)
    }

    async fn read_existing(path: &Path) -> Option<LockInfo> {
        let content = tokio::fs::read_to_string(path).await.ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Read the current holder without acquiring.
    pub async fn holder(lock_dir: &Path, service: &ServiceName) -> Option<LockInfo> {
        Self::read_existing(&LockInfo::lock_path(lock_dir, service)).await
    }

    /// Release the lock.
    pub async fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::lock_error(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
