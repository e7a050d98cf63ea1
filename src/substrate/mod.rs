// ABOUTME: Contracts for the external collaborators switchyard drives.
// ABOUTME: Compute, routing, source, build, and registry traits plus command and in-memory providers.

mod build;
pub mod command;
mod compute;
mod error;
pub mod http;
pub mod memory;
mod registry;
mod routing;
mod source;

pub use build::{BuildError, BuildOps, BuiltArtifact};
pub use compute::{ComputeError, ComputeOps, LaunchSpec, ProbeStatus};
pub use error::ProviderError;
pub use registry::{ArtifactRegistry, LedgerRegistry, RegistryError, TagLedger};
pub use routing::{RoutingError, RoutingOps, RuleTarget};
pub use source::{SourceBundle, SourceError, SourceOps};
