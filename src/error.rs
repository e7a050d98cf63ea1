// ABOUTME: Application-wide error types for switchyard.
// ABOUTME: Wraps module errors and maps them to CLI exit codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::{DeployError, DeployErrorKind};
use crate::pipeline::{PipelineError, PipelineErrorKind};
use crate::store::StoreError;
use crate::types::{DeploymentId, PipelineRunId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("deployment {deployment} rolled back: {reason}")]
    RolledBack {
        deployment: DeploymentId,
        reason: String,
    },

    #[error("pipeline run {run} failed: {failure}")]
    RunFailed { run: PipelineRunId, failure: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code: 2 for rejected requests, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidRequest(_) => 2,
            Error::Deploy(e) => match e.kind() {
                DeployErrorKind::DeploymentInProgress
                | DeployErrorKind::LockHeld
                | DeployErrorKind::InvalidRequest
                | DeployErrorKind::NoActiveDeployment => 2,
                _ => 1,
            },
            Error::Pipeline(e) if e.kind() == PipelineErrorKind::Ignored => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
