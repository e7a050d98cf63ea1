// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent mixing endpoint, group, rule, and run IDs.

mod artifact_ref;
mod id;
mod revision;
mod service_name;

pub use artifact_ref::{ArtifactRef, ParseArtifactRefError};
pub use id::{DeploymentId, EndpointId, Id, PipelineRunId, RuleId, TargetGroupId};
pub use revision::{RevisionError, RevisionId, TriggerEvent};
pub use service_name::{ServiceName, ServiceNameError};
