// ABOUTME: Release pipeline from source revision to deployed artifact.
// ABOUTME: Exports the pipeline, its run record, and the deployer seam.

mod error;
mod release;
mod run;

pub use error::{PipelineError, PipelineErrorKind};
pub use release::{Deployer, OrchestratorDeployer, PipelineSettings, ReleasePipeline};
pub use run::{PipelineRun, RunFailure, StageName, StageRecord, StageStatus};
