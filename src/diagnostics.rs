// ABOUTME: Diagnostics accumulator for non-fatal warnings during a command.
// ABOUTME: Collects lock, retire, rollback-request and deploy-timeout problems shown after the result.

use std::fmt;

use crate::deploy::Deployment;
use crate::pipeline::{PipelineErrorKind, PipelineRun};

/// Collects non-fatal warnings while a command runs. Identical warnings are
/// kept once; the rollback poller can report the same problem every tick.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        if self.warnings.contains(&warning) {
            return;
        }
        tracing::warn!(kind = %warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Pick up the warnings a settled deployment carries.
    pub fn record_deployment(&mut self, deployment: &Deployment) {
        for message in &deployment.warnings {
            self.warn(Warning::retire_failed(format!(
                "{}: {message}",
                deployment.id
            )));
        }
    }

    /// A run whose deploy stage timed out left its deployment running.
    pub fn record_run(&mut self, run: &PipelineRun) {
        let timed_out = run
            .failure
            .as_ref()
            .is_some_and(|f| f.kind == PipelineErrorKind::DeployTimedOut);
        if let (true, Some(id)) = (timed_out, &run.deployment) {
            let state = run
                .deployment_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "an unknown state".to_string());
            self.warn(Warning::deploy_timed_out(format!(
                "deployment {id} was still {state} when run {} gave up waiting",
                run.id
            )));
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    /// A target group could not be retired after the deployment settled.
    pub fn retire_failed(message: impl Into<String>) -> Self {
        Self::new(WarningKind::RetireFailed, message)
    }

    /// A rollback request could not be read or applied.
    pub fn rollback_request(message: impl Into<String>) -> Self {
        Self::new(WarningKind::RollbackRequest, message)
    }

    pub fn deploy_timed_out(message: impl Into<String>) -> Self {
        Self::new(WarningKind::DeployTimedOut, message)
    }

    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// Endpoints of a replaced or discarded group may still be running.
    RetireFailed,
    RollbackRequest,
    /// The pipeline stopped waiting; the deployment kept going.
    DeployTimedOut,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WarningKind::LockRelease => "lock release",
            WarningKind::RetireFailed => "retire failed",
            WarningKind::RollbackRequest => "rollback request",
            WarningKind::DeployTimedOut => "deploy timed out",
        })
    }
}
