// ABOUTME: Release command implementation.
// ABOUTME: Runs source, build, and deploy for one revision under the deploy lock.

use super::session::Session;
use std::sync::Arc;
use switchyard::diagnostics::{Diagnostics, Warning};
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::pipeline::{
    OrchestratorDeployer, PipelineError, PipelineErrorKind, PipelineRun, PipelineSettings,
    ReleasePipeline, StageStatus,
};
use switchyard::substrate::LedgerRegistry;
use switchyard::substrate::command::{CommandBuild, CommandSource};
use switchyard::types::{RevisionId, TriggerEvent};

pub async fn release(
    mut session: Session,
    revision: String,
    branch: Option<String>,
    force: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    let revision = RevisionId::new(&revision).map_err(|e| Error::InvalidRequest(e.to_string()))?;
    let branch = branch.unwrap_or_else(|| session.config.pipeline.branch.clone());
    let event = TriggerEvent::new(revision, branch);

    let registry = LedgerRegistry::open(session.store.registry_path())
        .map_err(|e| Error::Pipeline(PipelineError::Registry(e)))?;
    let pipeline = ReleasePipeline::new(
        Arc::new(CommandSource::from_config(
            &session.config,
            &session.project_dir,
        )),
        Arc::new(CommandBuild::from_config(&session.config)),
        Arc::new(registry),
        Arc::new(OrchestratorDeployer::new(
            session.orchestrator.clone(),
            session.service().clone(),
        )),
        PipelineSettings::from_config(&session.config),
    )
    .with_store(session.store.clone());

    output.progress(&format!(
        "Releasing {} from {} ({})",
        event.revision.short(),
        event.branch,
        session.config.service
    ));

    let lock = session.lock(force, &output).await?;
    let result = pipeline.run(event).await;

    if let Ok(run) = &result {
        report(run, &output);
        diag.record_run(run);
        if run.failure.as_ref().map(|f| f.kind) == Some(PipelineErrorKind::DeployTimedOut) {
            output.progress("  → Waiting for the deployment to settle");
            for d in pipeline.wait_detached().await {
                output.progress(&format!("  → Deployment {} settled: {}", d.id, d.state));
                diag.record_deployment(&d);
            }
        }
    }

    if let Err(e) = lock.release().await {
        diag.warn(Warning::lock_release(e.to_string()));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let run = result?;
    match &run.failure {
        None => {
            output.success(&format!(
                "Release {} completed: {}",
                run.id,
                run.artifact
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            ));
            Ok(())
        }
        Some(failure) => Err(Error::RunFailed {
            run: run.id.clone(),
            failure: format!("{} stage: {}", failure.stage, failure.message),
        }),
    }
}

fn report(run: &PipelineRun, output: &Output) {
    for stage in &run.stages {
        let mark = match stage.status {
            StageStatus::Succeeded => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Running => "…",
            StageStatus::Pending => "-",
        };
        output.progress(&format!("  {mark} {}", stage.name));
    }
    if let Some(artifact) = &run.artifact {
        output.progress(&format!("  → Artifact {artifact}"));
    }
    if let Some(deployment) = &run.deployment {
        let state = run
            .deployment_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        output.progress(&format!("  → Deployment {deployment}: {state}"));
    }
}
