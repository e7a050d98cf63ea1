// ABOUTME: JSON state store under the configured state directory.
// ABOUTME: Current and archived deployments, pool ledgers, pipeline runs, and rollback requests.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::deploy::Deployment;
use crate::pipeline::PipelineRun;
use crate::pool::PoolLedger;
use crate::types::{DeploymentId, PipelineRunId, ServiceName};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Files written by one switchyard process and read by the next.
///
/// ```text
/// <root>/deployments/<service>/current.json
/// <root>/deployments/<service>/archive/<deployment-id>.json
/// <root>/pools/<service>.json
/// <root>/runs/<run-id>.json
/// <root>/requests/<service>.rollback
/// <root>/locks/<service>.lock
/// <root>/registry.json
/// ```
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    fn service_dir(&self, service: &ServiceName) -> PathBuf {
        self.root.join("deployments").join(service.as_str())
    }

    fn rollback_request_path(&self, service: &ServiceName) -> PathBuf {
        self.root
            .join("requests")
            .join(format!("{service}.rollback"))
    }

    pub async fn save_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let path = self.service_dir(&deployment.service).join("current.json");
        write_json(&path, deployment).await
    }

    /// The most recent deployment of `service`, settled or not.
    pub async fn load_deployment(
        &self,
        service: &ServiceName,
    ) -> Result<Option<Deployment>, StoreError> {
        read_json(&self.service_dir(service).join("current.json")).await
    }

    pub async fn archive_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let path = self
            .service_dir(&deployment.service)
            .join("archive")
            .join(format!("{}.json", deployment.id));
        write_json(&path, deployment).await
    }

    /// Archived deployments, oldest first.
    pub async fn archived_deployments(
        &self,
        service: &ServiceName,
    ) -> Result<Vec<Deployment>, StoreError> {
        let mut deployments: Vec<Deployment> =
            read_dir_json(&self.service_dir(service).join("archive")).await?;
        deployments.sort_by_key(|d| d.started_at);
        Ok(deployments)
    }

    pub async fn save_ledger(
        &self,
        service: &ServiceName,
        ledger: &PoolLedger,
    ) -> Result<(), StoreError> {
        let path = self.root.join("pools").join(format!("{service}.json"));
        write_json(&path, ledger).await
    }

    pub async fn load_ledger(&self, service: &ServiceName) -> Result<Option<PoolLedger>, StoreError> {
        read_json(&self.root.join("pools").join(format!("{service}.json"))).await
    }

    pub async fn save_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        let path = self.root.join("runs").join(format!("{}.json", run.id));
        write_json(&path, run).await
    }

    pub async fn load_run(&self, id: &PipelineRunId) -> Result<Option<PipelineRun>, StoreError> {
        read_json(&self.root.join("runs").join(format!("{id}.json"))).await
    }

    /// All recorded pipeline runs, oldest first.
    pub async fn runs(&self) -> Result<Vec<PipelineRun>, StoreError> {
        let mut runs: Vec<PipelineRun> = read_dir_json(&self.root.join("runs")).await?;
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }

    /// Leave a rollback request for the process running `deployment`.
    pub async fn request_rollback(
        &self,
        service: &ServiceName,
        deployment: &DeploymentId,
    ) -> Result<(), StoreError> {
        let path = self.rollback_request_path(service);
        write_atomic(&path, deployment.as_str().as_bytes()).await
    }

    /// Consume a pending rollback request, if any.
    pub async fn take_rollback_request(
        &self,
        service: &ServiceName,
    ) -> Result<Option<DeploymentId>, StoreError> {
        let path = self.rollback_request_path(service);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(StoreError::Io { path, source }),
        }
        Ok(Some(DeploymentId::new(content.trim())))
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &json).await
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.map_err(io)?;
    tokio::fs::rename(&tmp, path).await.map_err(io)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_dir_json<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let io = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io(e)),
    };

    let mut values = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(value) = read_json(&path).await? {
            values.push(value);
        }
    }
    Ok(values)
}
