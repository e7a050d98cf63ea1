// ABOUTME: Health report produced by one sweep over a target group's endpoints.
// ABOUTME: Kept on the deployment record; answers "healthy?" and "what regressed?".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::group::{EndpointHealth, Slot};
use crate::substrate::ProbeStatus;
use crate::types::{EndpointId, TargetGroupId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointReport {
    pub endpoint: EndpointId,
    pub health: EndpointHealth,
    pub probe: ProbeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub group: TargetGroupId,
    pub slot: Slot,
    pub checked_at: DateTime<Utc>,
    pub endpoints: Vec<EndpointReport>,
}

impl HealthReport {
    /// Every endpoint has reached the healthy threshold. An empty group is
    /// never healthy.
    pub fn is_healthy(&self) -> bool {
        !self.endpoints.is_empty()
            && self
                .endpoints
                .iter()
                .all(|e| e.health == EndpointHealth::Healthy)
    }

    /// First endpoint that reported a terminal signal.
    pub fn terminal(&self) -> Option<(&EndpointId, &str)> {
        self.endpoints.iter().find_map(|e| match &e.probe {
            ProbeStatus::Terminal(reason) => Some((&e.endpoint, reason.as_str())),
            _ => None,
        })
    }

    /// Endpoints whose latest check did not pass, or that are already
    /// unhealthy. Ignores streak thresholds: one failed check counts.
    pub fn regressions(&self) -> Vec<&EndpointReport> {
        self.endpoints
            .iter()
            .filter(|e| e.health == EndpointHealth::Unhealthy || !e.probe.is_passing())
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.health == EndpointHealth::Healthy)
            .count()
    }

    /// One-line description of the regressions, for rollback reasons.
    pub fn describe_regressions(&self) -> String {
        self.regressions()
            .iter()
            .map(|e| match &e.probe {
                ProbeStatus::Passing => format!("{} {}", e.endpoint, e.health),
                ProbeStatus::Failing(detail) | ProbeStatus::Terminal(detail) => {
                    format!("{} {} ({detail})", e.endpoint, e.health)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
