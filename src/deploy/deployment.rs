// ABOUTME: Deployment record: identity, candidate, state, evidence, and transition history.
// ABOUTME: Created when an artifact is accepted and archived once it reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::error::DeployError;
use super::state::DeploymentState;
use crate::interrupt::InterruptReason;
use crate::pool::{HealthReport, TargetGroupHandle};
use crate::types::{ArtifactRef, DeploymentId, ServiceName};
use crate::verify::ProbeOutcome;

/// Why a deployment was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", content = "detail", rename_all = "snake_case")]
pub enum RollbackReason {
    ProvisionFailed(String),
    HealthCheckTimeout(String),
    HealthCheckFailed(String),
    VerificationFailed(String),
    RuleUpdateFailed(String),
    HealthRegression(String),
    Fault(String),
    ManualRollback,
    Cancelled,
}

impl From<InterruptReason> for RollbackReason {
    fn from(reason: InterruptReason) -> Self {
        match reason {
            InterruptReason::ManualRollback => RollbackReason::ManualRollback,
            InterruptReason::Fault(detail) => RollbackReason::Fault(detail),
            InterruptReason::Cancelled => RollbackReason::Cancelled,
        }
    }
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackReason::ProvisionFailed(d) => write!(f, "provisioning failed: {d}"),
            RollbackReason::HealthCheckTimeout(d) => write!(f, "health check timed out: {d}"),
            RollbackReason::HealthCheckFailed(d) => write!(f, "health check failed: {d}"),
            RollbackReason::VerificationFailed(d) => write!(f, "verification failed: {d}"),
            RollbackReason::RuleUpdateFailed(d) => write!(f, "rule update failed: {d}"),
            RollbackReason::HealthRegression(d) => write!(f, "health regression while baking: {d}"),
            RollbackReason::Fault(d) => write!(f, "fault signal: {d}"),
            RollbackReason::ManualRollback => f.write_str("manual rollback requested"),
            RollbackReason::Cancelled => f.write_str("deployment cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: DeploymentState,
    pub to: DeploymentState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub service: ServiceName,
    pub artifact: ArtifactRef,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: DeploymentState,
    #[serde(with = "humantime_serde")]
    pub bake_time: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<TargetGroupHandle>,
    /// Group that served production when the shift began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<TargetGroupHandle>,
    /// The production rule may have been repointed at the candidate.
    #[serde(default)]
    pub shifted: bool,
    /// The pool roles were swapped.
    #[serde(default)]
    pub promoted: bool,
    #[serde(default)]
    pub health_reports: Vec<HealthReport>,
    #[serde(default)]
    pub verification: Vec<ProbeOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<RollbackReason>,
    /// Set when a step of the rollback itself failed; the deployment stays
    /// in ROLLING_BACK until an operator resolves it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervention_required: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl Deployment {
    pub fn new(service: ServiceName, artifact: ArtifactRef, bake_time: Duration) -> Self {
        Self {
            id: DeploymentId::generate("dep"),
            service,
            artifact,
            started_at: Utc::now(),
            finished_at: None,
            state: DeploymentState::Pending,
            bake_time,
            candidate: None,
            previous: None,
            shifted: false,
            promoted: false,
            health_reports: Vec::new(),
            verification: Vec::new(),
            rollback_reason: None,
            intervention_required: None,
            warnings: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Move to `next`, recording the step. Terminal states stamp `finished_at`.
    pub fn transition(&mut self, next: DeploymentState) -> Result<(), DeployError> {
        if !self.state.can_transition_to(next) {
            return Err(DeployError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        let now = Utc::now();
        self.history.push(TransitionRecord {
            from: self.state,
            to: next,
            at: now,
        });
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Terminal, or stuck waiting for an operator.
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() || self.intervention_required.is_some()
    }
}
