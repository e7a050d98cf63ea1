// ABOUTME: Deployment state machine, controller, and per-service orchestration.
// ABOUTME: Exports the Deployment record, its states, the controller, and the deploy lock.

mod controller;
mod deployment;
mod error;
mod lock;
mod orchestrator;
mod state;

pub use controller::{ControllerSettings, DeploymentController};
pub use deployment::{Deployment, RollbackReason, TransitionRecord};
pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use lock::{DeployLock, LockInfo};
pub use orchestrator::{DeploymentHandle, Orchestrator};
pub use state::DeploymentState;
