// ABOUTME: Error types for target pool operations.
// ABOUTME: Provisioning, health waiting, role changes, and retirement failures.

use std::time::Duration;

use super::group::{Role, Slot};
use crate::interrupt::InterruptReason;
use crate::types::{EndpointId, TargetGroupId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("failed to provision {group}: {reason}")]
    ProvisionError { group: TargetGroupId, reason: String },

    #[error("{group} not healthy after {timeout:?} ({healthy} of {total} endpoints healthy)")]
    HealthCheckTimeout {
        group: TargetGroupId,
        timeout: Duration,
        healthy: usize,
        total: usize,
    },

    #[error("{group} endpoint {endpoint} failed: {reason}")]
    HealthCheckFailed {
        group: TargetGroupId,
        endpoint: EndpointId,
        reason: String,
    },

    #[error("interrupted: {0}")]
    Interrupted(InterruptReason),

    #[error("stale handle for {slot} slot (generation {held}, now {current})")]
    StaleHandle { slot: Slot, held: u64, current: u64 },

    #[error("cannot {operation} {slot} slot while it is {role}")]
    InvalidRole {
        operation: &'static str,
        slot: Slot,
        role: Role,
    },

    #[error("failed to retire {group}: {reason}")]
    RetireFailed { group: TargetGroupId, reason: String },
}
