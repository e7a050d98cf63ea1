// ABOUTME: Wires config, state store, command providers, and the orchestrator for one command.
// ABOUTME: Restores the last deployment and pool ledger so every process sees the same state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard::config::Config;
use switchyard::deploy::{
    ControllerSettings, DeployLock, Deployment, DeploymentController, DeploymentState,
    Orchestrator,
};
use switchyard::error::Result;
use switchyard::output::Output;
use switchyard::pool::{PoolLedger, PoolSettings, TargetPoolManager};
use switchyard::router::{RouterSettings, TrafficRouter};
use switchyard::store::StateStore;
use switchyard::substrate::command::{CommandCompute, CommandRouting};
use switchyard::types::ServiceName;
use switchyard::verify::HttpVerifier;

pub type CommandOrchestrator = Orchestrator<CommandCompute, CommandRouting, HttpVerifier>;

pub struct Session {
    pub config: Config,
    pub project_dir: PathBuf,
    pub store: Arc<StateStore>,
    pub orchestrator: Arc<CommandOrchestrator>,
    restored: Option<Deployment>,
}

impl Session {
    pub async fn open(project_dir: &Path) -> Result<Self> {
        let config = Config::discover(project_dir)?;
        let store = Arc::new(StateStore::new(config.state_dir(project_dir)));

        let ledger = match store.load_ledger(&config.service).await? {
            Some(ledger) => ledger,
            None => PoolLedger::new(config.target_groups.ids(&config.service)),
        };

        let compute = Arc::new(CommandCompute::from_config(&config, project_dir));
        let routing = Arc::new(CommandRouting::from_config(&config, project_dir));
        let pool = Arc::new(TargetPoolManager::from_ledger(
            compute,
            PoolSettings::from_config(&config),
            ledger,
        ));
        let router = Arc::new(TrafficRouter::new(
            routing,
            RouterSettings::from_config(&config),
        ));
        let verifier = Arc::new(HttpVerifier::from_config(&config));
        let controller = DeploymentController::new(
            pool,
            router,
            verifier,
            ControllerSettings::from_config(&config),
        );

        let orchestrator = Orchestrator::new().with_store(store.clone());
        orchestrator.register(controller);

        let restored = store.load_deployment(&config.service).await?;
        if let Some(deployment) = &restored {
            orchestrator.restore(deployment.clone())?;
        }

        Ok(Self {
            config,
            project_dir: project_dir.to_path_buf(),
            store,
            orchestrator: Arc::new(orchestrator),
            restored,
        })
    }

    pub fn service(&self) -> &ServiceName {
        &self.config.service
    }

    /// Take the service's deploy lock. A deployment left unsettled by a
    /// process that no longer holds the lock is marked for intervention.
    pub async fn lock(&mut self, force: bool, output: &Output) -> Result<DeployLock> {
        output.progress("  → Acquiring deploy lock...");
        let lock = DeployLock::acquire(&self.store.lock_dir(), &self.config.service, force).await?;

        if let Some(deployment) = self.restored.as_mut() {
            let abandoned = !deployment.is_settled() && deployment.state != DeploymentState::Pending;
            if abandoned {
                output.warning(&format!(
                    "deployment {} was left in {}; run `switchyard resolve` to finish it",
                    deployment.id, deployment.state
                ));
                deployment.intervention_required =
                    Some("the deploying process exited before the deployment settled".to_string());
                self.store.save_deployment(deployment).await?;
                self.orchestrator.restore(deployment.clone())?;
            }
        }
        Ok(lock)
    }
}
