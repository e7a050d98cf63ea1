// ABOUTME: Orchestrator: the per-service map of controllers and their running deployments.
// ABOUTME: Rejects concurrent triggers, routes rollback/fault/cancel signals, persists progress.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::controller::DeploymentController;
use super::deployment::Deployment;
use super::error::DeployError;
use super::state::DeploymentState;
use crate::interrupt::{InterruptHandle, InterruptReason, interrupt_channel};
use crate::pool::TargetPoolManager;
use crate::store::StateStore;
use crate::substrate::{ComputeOps, RoutingOps};
use crate::types::{ArtifactRef, DeploymentId, ServiceName};
use crate::verify::Verifier;

struct Tracked {
    status: watch::Receiver<Deployment>,
    publish: Arc<watch::Sender<Deployment>>,
    interrupt: InterruptHandle,
}

impl Tracked {
    fn snapshot(&self) -> Deployment {
        self.status.borrow().clone()
    }
}

struct ServiceEntry<C, R, V> {
    controller: Arc<DeploymentController<C, R, V>>,
    current: Mutex<Option<Tracked>>,
}

/// A running deployment, as seen by whoever triggered it.
#[derive(Debug)]
pub struct DeploymentHandle {
    status: watch::Receiver<Deployment>,
    task: JoinHandle<Deployment>,
}

impl DeploymentHandle {
    pub fn id(&self) -> DeploymentId {
        self.status.borrow().id.clone()
    }

    pub fn current(&self) -> Deployment {
        self.status.borrow().clone()
    }

    /// A receiver that sees every published state.
    pub fn subscribe(&self) -> watch::Receiver<Deployment> {
        self.status.clone()
    }

    /// Wait until the deployment is terminal or needs an operator.
    pub async fn wait_settled(&mut self) -> Deployment {
        let settled = self
            .status
            .wait_for(Deployment::is_settled)
            .await
            .map(|d| d.clone());
        match settled {
            Ok(d) => d,
            Err(_) => self.status.borrow().clone(),
        }
    }

    /// Wait for the deployment task, including its final persistence.
    pub async fn finish(self) -> Deployment {
        let fallback = self.status.borrow().clone();
        match self.task.await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(deployment = %fallback.id, error = %e, "deployment task failed");
                fallback
            }
        }
    }
}

/// Owns one controller per registered service. Services deploy in parallel;
/// each service runs at most one non-terminal deployment.
pub struct Orchestrator<C, R, V> {
    services: RwLock<HashMap<ServiceName, Arc<ServiceEntry<C, R, V>>>>,
    store: Option<Arc<StateStore>>,
}

impl<C, R, V> Default for Orchestrator<C, R, V> {
    fn default() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            store: None,
        }
    }
}

impl<C, R, V> std::fmt::Debug for Orchestrator<C, R, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("services", &self.services.read().keys().collect::<Vec<_>>())
            .field("store", &self.store)
            .finish()
    }
}

impl<C, R, V> Orchestrator<C, R, V>
where
    C: ComputeOps + 'static,
    R: RoutingOps + 'static,
    V: Verifier + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist every published state and the pool ledger into `store`.
    pub fn with_store(mut self, store: Arc<StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn register(&self, controller: DeploymentController<C, R, V>) {
        let service = controller.pool().service().clone();
        tracing::debug!(%service, "service registered");
        self.services.write().insert(
            service,
            Arc::new(ServiceEntry {
                controller: Arc::new(controller),
                current: Mutex::new(None),
            }),
        );
    }

    /// Seed a service with a deployment loaded from a previous process, so
    /// status and resolve see it.
    pub fn restore(&self, deployment: Deployment) -> Result<(), DeployError> {
        let entry = self.entry(&deployment.service)?;
        let (tx, rx) = watch::channel(deployment);
        let (interrupt, _) = interrupt_channel();
        *entry.current.lock() = Some(Tracked {
            status: rx,
            publish: Arc::new(tx),
            interrupt,
        });
        Ok(())
    }

    fn entry(&self, service: &ServiceName) -> Result<Arc<ServiceEntry<C, R, V>>, DeployError> {
        self.services
            .read()
            .get(service)
            .cloned()
            .ok_or_else(|| DeployError::UnknownService(service.clone()))
    }

    pub fn pool(&self, service: &ServiceName) -> Result<Arc<TargetPoolManager<C>>, DeployError> {
        Ok(self.entry(service)?.controller.pool().clone())
    }

    /// Accept `artifact` for `service` and start deploying it.
    pub fn trigger(
        &self,
        service: &ServiceName,
        artifact: ArtifactRef,
    ) -> Result<DeploymentHandle, DeployError> {
        let entry = self.entry(service)?;
        let mut current = entry.current.lock();
        if let Some(tracked) = current.as_ref() {
            let active = tracked.status.borrow();
            if !active.state.is_terminal() {
                return Err(DeployError::DeploymentInProgress {
                    service: service.clone(),
                    id: active.id.clone(),
                    state: active.state,
                });
            }
        }

        let record = Deployment::new(
            service.clone(),
            artifact,
            entry.controller.settings().bake_time,
        );
        let (tx, rx) = watch::channel(record.clone());
        let publish = Arc::new(tx);
        let (handle, interrupt) = interrupt_channel();
        *current = Some(Tracked {
            status: rx.clone(),
            publish: publish.clone(),
            interrupt: handle,
        });
        drop(current);

        tracing::info!(
            deployment = %record.id,
            %service,
            artifact = %record.artifact,
            "deployment accepted"
        );

        let persist = self
            .store
            .clone()
            .map(|store| spawn_persist(store, rx.clone(), entry.controller.pool().clone()));
        let controller = entry.controller.clone();
        let task = tokio::spawn(async move {
            let deployment = controller.run(record, interrupt, &publish).await;
            if let Some(persist) = persist {
                if let Err(e) = persist.await {
                    tracing::warn!(error = %e, "state persistence task failed");
                }
            }
            deployment
        });

        Ok(DeploymentHandle { status: rx, task })
    }

    /// Latest deployment of `service`. Terminal deployments are returned
    /// unchanged on every call.
    pub fn status(&self, service: &ServiceName) -> Result<Deployment, DeployError> {
        let entry = self.entry(service)?;
        let current = entry.current.lock();
        current
            .as_ref()
            .map(Tracked::snapshot)
            .ok_or_else(|| DeployError::NoActiveDeployment(service.clone()))
    }

    pub fn request_rollback(&self, service: &ServiceName) -> Result<(), DeployError> {
        let entry = self.entry(service)?;
        let current = entry.current.lock();
        let tracked = current
            .as_ref()
            .ok_or_else(|| DeployError::NoActiveDeployment(service.clone()))?;
        let d = tracked.snapshot();
        if !d.state.accepts_manual_rollback() {
            return Err(DeployError::RollbackNotAccepted {
                id: d.id,
                state: d.state,
            });
        }
        tracing::warn!(deployment = %d.id, state = %d.state, "manual rollback requested");
        tracked.interrupt.fire(InterruptReason::ManualRollback);
        Ok(())
    }

    /// External fault signal (alarm). Acted on only while BAKING.
    pub fn report_fault(
        &self,
        service: &ServiceName,
        detail: impl Into<String>,
    ) -> Result<(), DeployError> {
        let entry = self.entry(service)?;
        let current = entry.current.lock();
        let tracked = current
            .as_ref()
            .ok_or_else(|| DeployError::NoActiveDeployment(service.clone()))?;
        let d = tracked.snapshot();
        if d.state != DeploymentState::Baking {
            return Err(DeployError::InvalidRequest(format!(
                "deployment {} is {}; fault signals apply only while BAKING",
                d.id, d.state
            )));
        }
        let detail = detail.into();
        tracing::warn!(deployment = %d.id, %detail, "fault signal received");
        tracked.interrupt.fire(InterruptReason::Fault(detail));
        Ok(())
    }

    /// Stop a deployment that hasn't settled. It rolls back like any failure.
    pub fn cancel(&self, service: &ServiceName) -> Result<(), DeployError> {
        let entry = self.entry(service)?;
        let current = entry.current.lock();
        let tracked = current
            .as_ref()
            .ok_or_else(|| DeployError::NoActiveDeployment(service.clone()))?;
        let d = tracked.snapshot();
        if d.state.is_terminal() || d.state == DeploymentState::RollingBack {
            return Err(DeployError::InvalidRequest(format!(
                "deployment {} is {} and can no longer be cancelled",
                d.id, d.state
            )));
        }
        tracked.interrupt.fire(InterruptReason::Cancelled);
        Ok(())
    }

    /// Finish a rollback that needed manual intervention.
    pub async fn resolve(&self, service: &ServiceName) -> Result<Deployment, DeployError> {
        let entry = self.entry(service)?;
        let (mut deployment, publish) = {
            let current = entry.current.lock();
            let tracked = current
                .as_ref()
                .ok_or_else(|| DeployError::NoActiveDeployment(service.clone()))?;
            (tracked.snapshot(), tracked.publish.clone())
        };
        if deployment.state.is_terminal() || deployment.intervention_required.is_none() {
            return Err(DeployError::InvalidRequest(format!(
                "deployment {} is {} and does not need resolving",
                deployment.id, deployment.state
            )));
        }

        entry
            .controller
            .resolve(&mut deployment, &publish)
            .await
            .map_err(|e| DeployError::InterventionRequired {
                id: deployment.id.clone(),
                reason: e.to_string(),
            })?;

        if let Some(store) = &self.store {
            persist_once(store, &deployment, entry.controller.pool()).await;
        }
        Ok(deployment)
    }
}

fn spawn_persist<C: ComputeOps + 'static>(
    store: Arc<StateStore>,
    mut status: watch::Receiver<Deployment>,
    pool: Arc<TargetPoolManager<C>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let deployment = status.borrow_and_update().clone();
            persist_once(&store, &deployment, &pool).await;
            if deployment.is_settled() || status.changed().await.is_err() {
                break;
            }
        }
    })
}

async fn persist_once<C: ComputeOps>(
    store: &StateStore,
    deployment: &Deployment,
    pool: &TargetPoolManager<C>,
) {
    if let Err(e) = store.save_deployment(deployment).await {
        tracing::warn!(deployment = %deployment.id, error = %e, "failed to save deployment");
    }
    if let Err(e) = store.save_ledger(&deployment.service, &pool.ledger()).await {
        tracing::warn!(service = %deployment.service, error = %e, "failed to save pool ledger");
    }
    if deployment.state.is_terminal() {
        if let Err(e) = store.archive_deployment(deployment).await {
            tracing::warn!(deployment = %deployment.id, error = %e, "failed to archive deployment");
        }
    }
}
