// ABOUTME: Error types for the release pipeline.
// ABOUTME: Ignored triggers, stage failures, and deploy-stage outcomes other than COMPLETED.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::deploy::{DeployError, DeploymentState};
use crate::substrate::{BuildError, RegistryError, SourceError};
use crate::types::DeploymentId;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("push to branch {branch} ignored; the pipeline watches {watched}")]
    BranchIgnored { branch: String, watched: String },

    #[error("push triggers are disabled for this pipeline")]
    PushTriggerDisabled,

    #[error("source stage failed: {0}")]
    SourceFailed(#[source] SourceError),

    #[error("build failed: {0}")]
    BuildFailed(#[source] BuildError),

    #[error("artifact push failed: {0}")]
    Registry(#[source] RegistryError),

    #[error("deployment rejected: {0}")]
    DeployRejected(#[source] DeployError),

    #[error("deployment {deployment} still {state} after {timeout:?}; it keeps running")]
    DeployTimedOut {
        deployment: DeploymentId,
        timeout: Duration,
        state: DeploymentState,
    },

    #[error("deployment {deployment} rolled back: {reason}")]
    DeploymentRolledBack {
        deployment: DeploymentId,
        reason: String,
    },

    #[error("deployment {deployment} needs manual intervention: {reason}")]
    InterventionRequired {
        deployment: DeploymentId,
        reason: String,
    },
}

/// Error kind for programmatic handling; also recorded on failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    /// The trigger event didn't start a run.
    Ignored,
    SourceFailed,
    BuildFailed,
    RegistryRejected,
    DeployRejected,
    DeployTimedOut,
    RolledBack,
    InterventionRequired,
}

impl PipelineError {
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::BranchIgnored { .. } | PipelineError::PushTriggerDisabled => {
                PipelineErrorKind::Ignored
            }
            PipelineError::SourceFailed(_) => PipelineErrorKind::SourceFailed,
            PipelineError::BuildFailed(_) => PipelineErrorKind::BuildFailed,
            PipelineError::Registry(_) => PipelineErrorKind::RegistryRejected,
            PipelineError::DeployRejected(_) => PipelineErrorKind::DeployRejected,
            PipelineError::DeployTimedOut { .. } => PipelineErrorKind::DeployTimedOut,
            PipelineError::DeploymentRolledBack { .. } => PipelineErrorKind::RolledBack,
            PipelineError::InterventionRequired { .. } => PipelineErrorKind::InterventionRequired,
        }
    }
}
