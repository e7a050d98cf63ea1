// ABOUTME: Release pipeline: source → build → deploy for one service.
// ABOUTME: A failed stage halts the run; the deploy timeout never cancels the deployment.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::error::PipelineError;
use super::run::{PipelineRun, StageName};
use crate::config::Config;
use crate::deploy::{DeployError, Deployment, DeploymentHandle, DeploymentState, Orchestrator};
use crate::store::StateStore;
use crate::substrate::{
    ArtifactRegistry, BuildError, BuildOps, ComputeOps, RoutingOps, SourceOps,
};
use crate::types::{ArtifactRef, ServiceName, TriggerEvent};
use crate::verify::Verifier;

/// Starts deployments for the pipeline's deploy stage.
pub trait Deployer: Send + Sync {
    fn deploy(&self, artifact: ArtifactRef) -> Result<DeploymentHandle, DeployError>;
}

/// Deploys through an orchestrator to one service.
pub struct OrchestratorDeployer<C, R, V> {
    orchestrator: Arc<Orchestrator<C, R, V>>,
    service: ServiceName,
}

impl<C, R, V> OrchestratorDeployer<C, R, V> {
    pub fn new(orchestrator: Arc<Orchestrator<C, R, V>>, service: ServiceName) -> Self {
        Self {
            orchestrator,
            service,
        }
    }
}

impl<C, R, V> Deployer for OrchestratorDeployer<C, R, V>
where
    C: ComputeOps + 'static,
    R: RoutingOps + 'static,
    V: Verifier + 'static,
{
    fn deploy(&self, artifact: ArtifactRef) -> Result<DeploymentHandle, DeployError> {
        self.orchestrator.trigger(&self.service, artifact)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub branch: String,
    pub trigger_on_push: bool,
    pub repository: String,
    pub deploy_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            branch: config.pipeline.branch.clone(),
            trigger_on_push: config.pipeline.trigger_on_push,
            repository: config.image_repository(),
            deploy_timeout: config.pipeline.deploy_timeout,
        }
    }
}

pub struct ReleasePipeline {
    source: Arc<dyn SourceOps>,
    build: Arc<dyn BuildOps>,
    registry: Arc<dyn ArtifactRegistry>,
    deployer: Arc<dyn Deployer>,
    settings: PipelineSettings,
    store: Option<Arc<StateStore>>,
    /// Deployments whose run stopped waiting for them.
    detached: Mutex<Vec<DeploymentHandle>>,
}

impl std::fmt::Debug for ReleasePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleasePipeline")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ReleasePipeline {
    pub fn new(
        source: Arc<dyn SourceOps>,
        build: Arc<dyn BuildOps>,
        registry: Arc<dyn ArtifactRegistry>,
        deployer: Arc<dyn Deployer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            build,
            registry,
            deployer,
            settings,
            store: None,
            detached: Mutex::new(Vec::new()),
        }
    }

    /// Record every stage change in `store`.
    pub fn with_store(mut self, store: Arc<StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Handle a push notification from source control.
    pub async fn on_push(&self, event: TriggerEvent) -> Result<PipelineRun, PipelineError> {
        if !self.settings.trigger_on_push {
            return Err(PipelineError::PushTriggerDisabled);
        }
        self.run(event).await
    }

    /// Run all stages for `event`. Only an event for another branch is an
    /// error here; stage failures are recorded on the returned run.
    pub async fn run(&self, event: TriggerEvent) -> Result<PipelineRun, PipelineError> {
        if event.branch != self.settings.branch {
            tracing::info!(
                branch = %event.branch,
                watched = %self.settings.branch,
                "trigger ignored"
            );
            return Err(PipelineError::BranchIgnored {
                branch: event.branch,
                watched: self.settings.branch.clone(),
            });
        }

        let mut run = PipelineRun::new(event);
        tracing::info!(
            run = %run.id,
            revision = %run.trigger.revision,
            branch = %run.trigger.branch,
            "pipeline run started"
        );
        self.persist(&run).await;

        for stage in StageName::ALL {
            run.start(stage);
            self.persist(&run).await;

            let result = match stage {
                StageName::Source => self.source_stage(&mut run).await,
                StageName::Build => self.build_stage(&mut run).await,
                StageName::Deploy => self.deploy_stage(&mut run).await,
            };

            match result {
                Ok(()) => {
                    tracing::info!(run = %run.id, %stage, "stage succeeded");
                    run.succeed(stage);
                    self.persist(&run).await;
                }
                Err(e) => {
                    tracing::warn!(run = %run.id, %stage, error = %e, "stage failed; run halted");
                    run.fail(stage, e.kind(), e.to_string());
                    self.persist(&run).await;
                    break;
                }
            }
        }

        Ok(run)
    }

    async fn source_stage(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let bundle = self
            .source
            .fetch(&run.trigger)
            .await
            .map_err(PipelineError::SourceFailed)?;
        run.bundle = Some(bundle);
        Ok(())
    }

    async fn build_stage(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let Some(bundle) = run.bundle.clone() else {
            return Err(PipelineError::BuildFailed(
                BuildError::Spawn("no source bundle".to_string()),
            ));
        };
        let built = self
            .build
            .build(&bundle, &self.settings.repository)
            .await
            .map_err(PipelineError::BuildFailed)?;
        run.build_log = Some(built.log);

        let pinned = self
            .registry
            .push(&run.trigger.revision, &built.artifact)
            .await
            .map_err(PipelineError::Registry)?;
        tracing::info!(run = %run.id, artifact = %pinned, "artifact ready");
        run.artifact = Some(pinned);
        Ok(())
    }

    async fn deploy_stage(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let Some(artifact) = run.artifact.clone() else {
            return Err(PipelineError::DeployRejected(DeployError::InvalidRequest(
                "no artifact to deploy".to_string(),
            )));
        };
        let mut handle = self
            .deployer
            .deploy(artifact)
            .map_err(PipelineError::DeployRejected)?;
        let deployment = handle.id();
        run.deployment = Some(deployment.clone());
        self.persist(run).await;

        let settled =
            tokio::time::timeout(self.settings.deploy_timeout, handle.wait_settled()).await;
        if settled.is_err() {
            let state = handle.current().state;
            run.deployment_state = Some(state);
            self.detached.lock().push(handle);
            return Err(PipelineError::DeployTimedOut {
                deployment,
                timeout: self.settings.deploy_timeout,
                state,
            });
        }
        // Settled: the task is done apart from its final persistence.
        let d = handle.finish().await;
        run.deployment_state = Some(d.state);

        match d.state {
            DeploymentState::Completed => Ok(()),
            DeploymentState::RolledBack => Err(PipelineError::DeploymentRolledBack {
                deployment,
                reason: d
                    .rollback_reason
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
            _ => Err(PipelineError::InterventionRequired {
                deployment,
                reason: d.intervention_required.unwrap_or_default(),
            }),
        }
    }

    /// Wait for deployments that outlived their run's deploy timeout.
    pub async fn wait_detached(&self) -> Vec<Deployment> {
        let handles: Vec<_> = std::mem::take(&mut *self.detached.lock());
        let mut settled = Vec::with_capacity(handles.len());
        for handle in handles {
            settled.push(handle.finish().await);
        }
        settled
    }

    async fn persist(&self, run: &PipelineRun) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_run(run).await {
                tracing::warn!(run = %run.id, error = %e, "failed to save pipeline run");
            }
        }
    }
}
