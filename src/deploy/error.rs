// ABOUTME: Error types for deployment requests and the deploy lock.
// ABOUTME: Rejected requests, invalid transitions, lock contention, and stuck rollbacks.

use chrono::{DateTime, Utc};
use std::fmt;

use super::state::DeploymentState;
use crate::types::{DeploymentId, ServiceName};

/// Who holds a deploy lock.
#[derive(Debug, Clone)]
pub struct LockHolderInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl fmt::Display for LockHolderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pid {}) since {}",
            self.holder,
            self.pid,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("deployment {id} of {service} is already in progress ({state})")]
    DeploymentInProgress {
        service: ServiceName,
        id: DeploymentId,
        state: DeploymentState,
    },

    #[error("no active deployment for {0}")]
    NoActiveDeployment(ServiceName),

    #[error("service {0} is not registered")]
    UnknownService(ServiceName),

    #[error(
        "deployment {id} is {state}; manual rollback is only accepted while VERIFYING, SHIFTING or BAKING"
    )]
    RollbackNotAccepted {
        id: DeploymentId,
        state: DeploymentState,
    },

    #[error("deployment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: DeploymentId,
        from: DeploymentState,
        to: DeploymentState,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("deploy lock held by {0}; use --force to break it")]
    LockHeld(Box<LockHolderInfo>),

    #[error("deploy lock error: {0}")]
    Lock(String),

    #[error("deployment {id} needs manual intervention: {reason}")]
    InterventionRequired { id: DeploymentId, reason: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// Another deployment of the service hasn't finished.
    DeploymentInProgress,
    NoActiveDeployment,
    UnknownService,
    /// The request doesn't fit the deployment's current state.
    InvalidRequest,
    InvalidTransition,
    LockHeld,
    Lock,
    InterventionRequired,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::DeploymentInProgress { .. } => DeployErrorKind::DeploymentInProgress,
            DeployError::NoActiveDeployment(_) => DeployErrorKind::NoActiveDeployment,
            DeployError::UnknownService(_) => DeployErrorKind::UnknownService,
            DeployError::RollbackNotAccepted { .. } | DeployError::InvalidRequest(_) => {
                DeployErrorKind::InvalidRequest
            }
            DeployError::InvalidTransition { .. } => DeployErrorKind::InvalidTransition,
            DeployError::LockHeld(_) => DeployErrorKind::LockHeld,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::InterventionRequired { .. } => DeployErrorKind::InterventionRequired,
        }
    }

    /// Holder details when the lock was already taken.
    pub fn lock_holder_info(&self) -> Option<&LockHolderInfo> {
        match self {
            DeployError::LockHeld(info) => Some(info),
            _ => None,
        }
    }

    pub(crate) fn lock_error(message: impl Into<String>) -> Self {
        DeployError::Lock(message.into())
    }

    pub(crate) fn lock_held(holder: String, pid: u32, started_at: DateTime<Utc>) -> Self {
        DeployError::LockHeld(Box::new(LockHolderInfo {
            holder,
            pid,
            started_at,
        }))
    }
}
