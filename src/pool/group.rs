// ABOUTME: Two-slot target group arena: slots, roles, endpoints, and streak tracking.
// ABOUTME: The ledger is the serializable snapshot the pool manager guards with one lock.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::HealthCheckPolicy;
use crate::substrate::ProbeStatus;
use crate::types::{ArtifactRef, EndpointId, TargetGroupId};

/// One of the two fixed target group slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Blue,
    Green,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Blue, Slot::Green];

    pub fn index(self) -> usize {
        match self {
            Slot::Blue => 0,
            Slot::Green => 1,
        }
    }

    pub fn other(self) -> Slot {
        match self {
            Slot::Blue => Slot::Green,
            Slot::Green => Slot::Blue,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Blue => f.write_str("blue"),
            Slot::Green => f.write_str("green"),
        }
    }
}

/// What a target group is currently for. Reassigned every deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Production,
    Staging,
    Retiring,
    Idle,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Production => f.write_str("production"),
            Role::Staging => f.write_str("staging"),
            Role::Retiring => f.write_str("retiring"),
            Role::Idle => f.write_str("idle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointHealth {
    Healthy,
    Unhealthy,
    Draining,
    Unknown,
}

impl fmt::Display for EndpointHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointHealth::Healthy => f.write_str("healthy"),
            EndpointHealth::Unhealthy => f.write_str("unhealthy"),
            EndpointHealth::Draining => f.write_str("draining"),
            EndpointHealth::Unknown => f.write_str("unknown"),
        }
    }
}

/// An endpoint registered with a target group, with its check streaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredEndpoint {
    pub id: EndpointId,
    pub health: EndpointHealth,
    #[serde(default)]
    pub passes: u32,
    #[serde(default)]
    pub failures: u32,
}

impl RegisteredEndpoint {
    pub fn new(id: EndpointId) -> Self {
        Self {
            id,
            health: EndpointHealth::Unknown,
            passes: 0,
            failures: 0,
        }
    }

    /// Fold one check result into the streaks and return the new health.
    ///
    /// Health only flips once a streak reaches the policy threshold; a
    /// terminal signal marks the endpoint unhealthy at once.
    pub fn record(&mut self, status: &ProbeStatus, policy: &HealthCheckPolicy) -> EndpointHealth {
        if self.health == EndpointHealth::Draining {
            return self.health;
        }
        match status {
            ProbeStatus::Passing => {
                self.failures = 0;
                self.passes = self.passes.saturating_add(1);
                if self.passes >= policy.healthy_threshold {
                    self.health = EndpointHealth::Healthy;
                }
            }
            ProbeStatus::Failing(_) => {
                self.passes = 0;
                self.failures = self.failures.saturating_add(1);
                if self.failures >= policy.unhealthy_threshold {
                    self.health = EndpointHealth::Unhealthy;
                }
            }
            ProbeStatus::Terminal(_) => {
                self.passes = 0;
                self.failures = self.failures.saturating_add(1);
                self.health = EndpointHealth::Unhealthy;
            }
        }
        self.health
    }
}

/// One slot of the arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub slot: Slot,
    pub id: TargetGroupId,
    pub role: Role,
    #[serde(default)]
    pub artifact: Option<ArtifactRef>,
    #[serde(default)]
    pub endpoints: Vec<RegisteredEndpoint>,
    /// Bumped every time the slot is handed a new candidate.
    #[serde(default)]
    pub generation: u64,
}

impl TargetGroup {
    fn idle(slot: Slot, id: TargetGroupId) -> Self {
        Self {
            slot,
            id,
            role: Role::Idle,
            artifact: None,
            endpoints: Vec::new(),
            generation: 0,
        }
    }

    pub fn handle(&self) -> TargetGroupHandle {
        TargetGroupHandle {
            slot: self.slot,
            id: self.id.clone(),
            generation: self.generation,
        }
    }

    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.endpoints.iter().map(|e| e.id.clone()).collect()
    }
}

/// Reference to one incarnation of a slot. Goes stale once the slot is
/// handed to a newer candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetGroupHandle {
    pub slot: Slot,
    pub id: TargetGroupId,
    pub generation: u64,
}

impl fmt::Display for TargetGroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.slot)
    }
}

/// Snapshot of the role of each slot, read in one piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub blue: Role,
    pub green: Role,
}

impl RoleAssignment {
    pub fn role(&self, slot: Slot) -> Role {
        match slot {
            Slot::Blue => self.blue,
            Slot::Green => self.green,
        }
    }

    pub fn production(&self) -> Option<Slot> {
        Slot::ALL
            .into_iter()
            .find(|slot| self.role(*slot) == Role::Production)
    }
}

/// The last role swap, so it can be undone exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub promoted: TargetGroupHandle,
    pub replaced: Option<TargetGroupHandle>,
}

/// Persistent state of both slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLedger {
    pub groups: [TargetGroup; 2],
    #[serde(default)]
    pub last_promotion: Option<Promotion>,
}

impl PoolLedger {
    /// Both slots idle, as before the first deployment.
    pub fn new(ids: [TargetGroupId; 2]) -> Self {
        let [blue, green] = ids;
        Self {
            groups: [
                TargetGroup::idle(Slot::Blue, blue),
                TargetGroup::idle(Slot::Green, green),
            ],
            last_promotion: None,
        }
    }

    pub fn group(&self, slot: Slot) -> &TargetGroup {
        &self.groups[slot.index()]
    }

    pub fn group_mut(&mut self, slot: Slot) -> &mut TargetGroup {
        &mut self.groups[slot.index()]
    }

    pub fn roles(&self) -> RoleAssignment {
        RoleAssignment {
            blue: self.group(Slot::Blue).role,
            green: self.group(Slot::Green).role,
        }
    }

    pub fn production(&self) -> Option<&TargetGroup> {
        self.groups.iter().find(|g| g.role == Role::Production)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> HealthCheckPolicy {
        HealthCheckPolicy {
            healthy_threshold: 3,
            unhealthy_threshold: 2,
            ..Default::default()
        }
    }

    #[test]
    fn healthy_after_threshold_passes() {
        let mut ep = RegisteredEndpoint::new(EndpointId::new("10.0.0.1:80"));
        let policy = policy();
        assert_eq!(ep.record(&ProbeStatus::Passing, &policy), EndpointHealth::Unknown);
        assert_eq!(ep.record(&ProbeStatus::Passing, &policy), EndpointHealth::Unknown);
        assert_eq!(ep.record(&ProbeStatus::Passing, &policy), EndpointHealth::Healthy);
    }

    #[test]
    fn failure_resets_pass_streak() {
        let mut ep = RegisteredEndpoint::new(EndpointId::new("10.0.0.1:80"));
        let policy = policy();
        ep.record(&ProbeStatus::Passing, &policy);
        ep.record(&ProbeStatus::Passing, &policy);
        ep.record(&ProbeStatus::Failing("503".into()), &policy);
        assert_eq!(ep.passes, 0);
        assert_eq!(ep.record(&ProbeStatus::Passing, &policy), EndpointHealth::Unknown);
    }

    #[test]
    fn single_failure_does_not_flip_healthy_endpoint() {
        let mut ep = RegisteredEndpoint::new(EndpointId::new("10.0.0.1:80"));
        let policy = policy();
        for _ in 0..3 {
            ep.record(&ProbeStatus::Passing, &policy);
        }
        assert_eq!(
            ep.record(&ProbeStatus::Failing("503".into()), &policy),
            EndpointHealth::Healthy
        );
        assert_eq!(
            ep.record(&ProbeStatus::Failing("503".into()), &policy),
            EndpointHealth::Unhealthy
        );
    }

    #[test]
    fn terminal_signal_is_immediately_unhealthy() {
        let mut ep = RegisteredEndpoint::new(EndpointId::new("10.0.0.1:80"));
        assert_eq!(
            ep.record(&ProbeStatus::Terminal("exited".into()), &policy()),
            EndpointHealth::Unhealthy
        );
    }

    #[test]
    fn fresh_ledger_has_no_production() {
        let ledger = PoolLedger::new([TargetGroupId::new("b"), TargetGroupId::new("g")]);
        assert_eq!(ledger.roles().production(), None);
        assert_eq!(ledger.roles().role(Slot::Green), Role::Idle);
    }
}
