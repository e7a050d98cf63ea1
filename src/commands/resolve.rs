// ABOUTME: Resolve command implementation.
// ABOUTME: Clears a deployment that stopped for manual intervention once routing is repaired.

use super::session::Session;
use switchyard::diagnostics::{Diagnostics, Warning};
use switchyard::error::Result;
use switchyard::output::Output;

pub async fn resolve(mut session: Session, force: bool, output: Output) -> Result<()> {
    let mut diag = Diagnostics::default();
    let lock = session.lock(force, &output).await?;

    let result = session.orchestrator.resolve(session.service()).await;
    if let Err(e) = lock.release().await {
        diag.warn(Warning::lock_release(e.to_string()));
    }

    let deployment = result?;
    diag.record_deployment(&deployment);
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.success(&format!(
        "Deployment {} resolved: {}",
        deployment.id, deployment.state
    ));
    Ok(())
}
