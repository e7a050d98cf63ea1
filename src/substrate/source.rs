// ABOUTME: Source control contract consumed by the pipeline's source stage.
// ABOUTME: Turns a trigger event into a source bundle the build stage can read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{RevisionId, TriggerEvent};

/// Fetched source for one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBundle {
    pub revision: RevisionId,
    pub branch: String,
    /// Directory the bundle was materialized into.
    pub path: PathBuf,
}

#[async_trait]
pub trait SourceOps: Send + Sync {
    async fn fetch(&self, event: &TriggerEvent) -> Result<SourceBundle, SourceError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("revision {0} not found")]
    RevisionNotFound(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),
}
