// ABOUTME: Target pool manager for the two blue/green target group slots.
// ABOUTME: Tracks endpoints, health streaks, and the production/staging role mapping.

mod error;
mod group;
mod manager;
mod report;

pub use error::PoolError;
pub use group::{
    EndpointHealth, PoolLedger, Promotion, RegisteredEndpoint, Role, RoleAssignment, Slot,
    TargetGroup, TargetGroupHandle,
};
pub use manager::{PoolSettings, TargetPoolManager};
pub use report::{EndpointReport, HealthReport};
