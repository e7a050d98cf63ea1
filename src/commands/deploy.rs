// ABOUTME: Deploy command implementation.
// ABOUTME: Holds the deploy lock, runs one deployment, and follows it until it settles.

use super::session::Session;
use std::time::Duration;
use switchyard::deploy::{DeployError, Deployment, DeploymentHandle, DeploymentState};
use switchyard::diagnostics::{Diagnostics, Warning};
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::types::ArtifactRef;

/// How often the deploying process looks for rollback requests.
const ROLLBACK_POLL: Duration = Duration::from_secs(1);

/// Deploy `artifact` (or the configured one) and wait for a terminal state.
pub async fn deploy(
    mut session: Session,
    artifact: Option<String>,
    force: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    let artifact = match artifact {
        Some(reference) => {
            ArtifactRef::parse(&reference).map_err(|e| Error::InvalidRequest(e.to_string()))?
        }
        None => session.config.artifact.clone(),
    };

    output.progress(&format!(
        "Deploying {} ({})",
        session.config.service, artifact
    ));

    let lock = session.lock(force, &output).await?;
    let result = run(&session, artifact, &output, &mut diag).await;
    if let Err(e) = lock.release().await {
        diag.warn(Warning::lock_release(e.to_string()));
    }

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let deployment = result?;
    settle(&deployment, &output)
}

async fn run(
    session: &Session,
    artifact: ArtifactRef,
    output: &Output,
    diag: &mut Diagnostics,
) -> Result<Deployment> {
    let handle = session
        .orchestrator
        .trigger(session.service(), artifact)?;
    output.progress(&format!("  → Deployment {} accepted", handle.id()));

    follow(session, &handle, output, diag).await;
    let deployment = handle.finish().await;
    diag.record_deployment(&deployment);
    Ok(deployment)
}

/// Print each state as it is entered and forward rollback requests left by
/// `switchyard rollback`, until the deployment settles.
async fn follow(
    session: &Session,
    handle: &DeploymentHandle,
    output: &Output,
    diag: &mut Diagnostics,
) {
    let mut status = handle.subscribe();
    let mut poll = tokio::time::interval(ROLLBACK_POLL);
    let mut last = None;

    loop {
        let current = status.borrow_and_update().clone();
        if last != Some(current.state) {
            output.progress(&format!("  → {}", current.state));
            last = Some(current.state);
        }
        if current.is_settled() {
            return;
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = poll.tick() => {
                match session.store.take_rollback_request(session.service()).await {
                    Ok(Some(id)) if id == current.id => {
                        if let Err(e) = session.orchestrator.request_rollback(session.service()) {
                            diag.warn(Warning::rollback_request(e.to_string()));
                        }
                    }
                    Ok(Some(id)) => diag.warn(Warning::rollback_request(format!(
                        "ignoring rollback request for {id}; {} is running",
                        current.id
                    ))),
                    Ok(None) => {}
                    Err(e) => diag.warn(Warning::rollback_request(e.to_string())),
                }
            }
        }
    }
}

/// Report how a deployment ended.
fn settle(deployment: &Deployment, output: &Output) -> Result<()> {
    match deployment.state {
        DeploymentState::Completed => {
            output.success(&format!(
                "Deployment {} completed: {} serves production",
                deployment.id, deployment.artifact
            ));
            Ok(())
        }
        DeploymentState::RolledBack => Err(Error::RolledBack {
            deployment: deployment.id.clone(),
            reason: deployment
                .rollback_reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".to_string()),
        }),
        state => Err(DeployError::InterventionRequired {
            id: deployment.id.clone(),
            reason: deployment
                .intervention_required
                .clone()
                .unwrap_or_else(|| format!("stopped in {state}")),
        }
        .into()),
    }
}
