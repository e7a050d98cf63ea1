// ABOUTME: Rollback command implementation.
// ABOUTME: Leaves a rollback request for the process running the deployment.

use super::session::Session;
use switchyard::deploy::DeployError;
use switchyard::error::Result;
use switchyard::output::Output;

/// Request a manual rollback. Only accepted while the latest deployment is
/// VERIFYING, SHIFTING or BAKING; the deploying process acts on it.
pub async fn rollback(session: Session, output: Output) -> Result<()> {
    let service = session.service().clone();
    let deployment = session
        .store
        .load_deployment(&service)
        .await?
        .ok_or_else(|| DeployError::NoActiveDeployment(service.clone()))?;

    if !deployment.state.accepts_manual_rollback() {
        return Err(DeployError::RollbackNotAccepted {
            id: deployment.id,
            state: deployment.state,
        }
        .into());
    }

    session
        .store
        .request_rollback(&service, &deployment.id)
        .await?;
    tracing::info!(deployment = %deployment.id, state = %deployment.state, "rollback requested");

    output.success(&format!(
        "Rollback of {} requested (currently {})",
        deployment.id, deployment.state
    ));
    Ok(())
}
