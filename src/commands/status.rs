// ABOUTME: Status command implementation.
// ABOUTME: Prints the latest deployment, its rollback reason, and the slot roles.

use super::session::Session;
use serde::Serialize;
use switchyard::deploy::Deployment;
use switchyard::error::Result;
use switchyard::output::Output;
use switchyard::pool::{PoolLedger, Slot};

#[derive(Serialize)]
struct StatusReport<'a> {
    service: &'a str,
    deployment: Option<&'a Deployment>,
    pool: &'a PoolLedger,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    history: Vec<Deployment>,
}

pub async fn status(session: Session, history: bool, output: Output) -> Result<()> {
    let service = session.service().clone();
    let deployment = session.store.load_deployment(&service).await?;
    let pool = session.orchestrator.pool(&service)?.ledger();
    let history = if history {
        session.store.archived_deployments(&service).await?
    } else {
        Vec::new()
    };

    let mut lines = vec![format!("Service: {service}")];
    match &deployment {
        Some(d) => lines.extend(describe(d)),
        None => lines.push("No deployments yet".to_string()),
    }
    for slot in Slot::ALL {
        let group = pool.group(slot);
        let artifact = group
            .artifact
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{slot}: {} {} ({} endpoints, {artifact})",
            group.id,
            group.role,
            group.endpoints.len()
        ));
    }
    for d in &history {
        lines.push(format!(
            "  {} {} {} {}",
            d.started_at.format("%Y-%m-%d %H:%M:%S"),
            d.id,
            d.state,
            d.artifact
        ));
    }

    output.record(
        &StatusReport {
            service: service.as_str(),
            deployment: deployment.as_ref(),
            pool: &pool,
            history,
        },
        &lines,
    );
    Ok(())
}

fn describe(d: &Deployment) -> Vec<String> {
    let mut lines = vec![
        format!("Deployment: {}", d.id),
        format!("State: {}", d.state),
        format!("Artifact: {}", d.artifact),
        format!("Started: {}", d.started_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];
    if let Some(finished) = d.finished_at {
        lines.push(format!("Finished: {}", finished.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(reason) = &d.rollback_reason {
        lines.push(format!("Rollback reason: {reason}"));
    }
    if let Some(detail) = &d.intervention_required {
        lines.push(format!("Needs intervention: {detail}"));
    }
    if !d.verification.is_empty() {
        let passed = d.verification.iter().filter(|p| p.passed).count();
        lines.push(format!(
            "Verification: {passed}/{} probes passed",
            d.verification.len()
        ));
    }
    for warning in &d.warnings {
        lines.push(format!("Warning: {warning}"));
    }
    lines
}
