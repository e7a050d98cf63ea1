// ABOUTME: Compute substrate contract consumed by the target pool manager.
// ABOUTME: Launch and terminate endpoints for an artifact, and health check a single endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{HealthCheckPolicy, Protocol};
use crate::types::{ArtifactRef, EndpointId, ServiceName, TargetGroupId};

/// What to launch for a target group.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub service: ServiceName,
    pub group: TargetGroupId,
    pub artifact: ArtifactRef,
    pub count: u32,
    pub port: u16,
    pub protocol: Protocol,
    pub health_check: HealthCheckPolicy,
    pub tags: BTreeMap<String, String>,
}

/// Outcome of one health check against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeStatus {
    Passing,
    /// Check failed but the endpoint may still recover.
    Failing(String),
    /// The endpoint is gone for good (crash loop, exited, evicted).
    Terminal(String),
}

impl ProbeStatus {
    pub fn is_passing(&self) -> bool {
        matches!(self, ProbeStatus::Passing)
    }
}

/// Compute operations against the provider.
#[async_trait]
pub trait ComputeOps: Send + Sync {
    /// Start `spec.count` endpoints running `spec.artifact`.
    async fn launch_endpoints(&self, spec: &LaunchSpec) -> Result<Vec<EndpointId>, ComputeError>;

    /// Deregister and stop endpoints, letting in-flight requests finish within
    /// `drain_timeout`.
    async fn terminate_endpoints(
        &self,
        endpoints: &[EndpointId],
        drain_timeout: Duration,
    ) -> Result<(), ComputeError>;

    /// Run one health check. Transport problems are reported as `Failing`.
    async fn health_check(&self, endpoint: &EndpointId, policy: &HealthCheckPolicy) -> ProbeStatus;
}

/// Errors from compute operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ComputeError {
    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("terminate failed: {0}")]
    TerminateFailed(String),
}
