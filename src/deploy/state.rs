// ABOUTME: Deployment states and the transitions allowed between them.
// ABOUTME: Terminal states never change; manual rollback is accepted only mid-flight.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    /// Record created, nothing touched yet.
    Pending,
    /// Candidate group launching and becoming healthy.
    Provisioning,
    /// Probes going through the test listener.
    Verifying,
    /// Production rule being repointed at the candidate.
    Shifting,
    /// Candidate serves production; watching for regressions.
    Baking,
    RollingBack,
    Completed,
    RolledBack,
}

impl DeploymentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentState::Completed | DeploymentState::RolledBack)
    }

    pub fn accepts_manual_rollback(self) -> bool {
        matches!(
            self,
            DeploymentState::Verifying | DeploymentState::Shifting | DeploymentState::Baking
        )
    }

    pub fn can_transition_to(self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (self, next),
            (Pending, Provisioning)
                | (Provisioning, Verifying)
                | (Verifying, Shifting)
                | (Shifting, Baking)
                | (Baking, Completed)
                | (Provisioning | Verifying | Shifting | Baking, RollingBack)
                | (RollingBack, RolledBack)
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentState::Pending => "PENDING",
            DeploymentState::Provisioning => "PROVISIONING",
            DeploymentState::Verifying => "VERIFYING",
            DeploymentState::Shifting => "SHIFTING",
            DeploymentState::Baking => "BAKING",
            DeploymentState::RollingBack => "ROLLING_BACK",
            DeploymentState::Completed => "COMPLETED",
            DeploymentState::RolledBack => "ROLLED_BACK",
        };
        f.write_str(name)
    }
}
