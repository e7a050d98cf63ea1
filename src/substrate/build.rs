// ABOUTME: Build toolchain contract consumed by the pipeline's build stage.
// ABOUTME: Transforms a source bundle into a deployable artifact reference.

use async_trait::async_trait;

use super::source::SourceBundle;
use crate::types::ArtifactRef;

#[derive(Debug, Clone)]
pub struct BuiltArtifact {
    pub artifact: ArtifactRef,
    /// Tail of the build output, kept for the run record.
    pub log: String,
}

#[async_trait]
pub trait BuildOps: Send + Sync {
    /// Build `bundle` into an artifact in `repository`.
    async fn build(&self, bundle: &SourceBundle, repository: &str)
    -> Result<BuiltArtifact, BuildError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    #[error("build exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("build produced no artifact")]
    MissingArtifact,

    #[error("build produced an invalid artifact reference: {0}")]
    InvalidArtifact(String),

    #[error("build could not run: {0}")]
    Spawn(String),
}
