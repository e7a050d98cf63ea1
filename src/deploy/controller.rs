// ABOUTME: Deployment controller: drives one deployment through its state machine.
// ABOUTME: Provision, verify, shift, bake, and roll back on any failure or interrupt.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::deployment::{Deployment, RollbackReason};
use super::state::DeploymentState;
use crate::config::Config;
use crate::interrupt::Interrupt;
use crate::pool::{PoolError, Role, Slot, TargetGroupHandle, TargetPoolManager};
use crate::router::{RouterError, TrafficRouter};
use crate::substrate::{ComputeOps, RoutingOps, RuleTarget};
use crate::verify::{Verifier, VerificationFailure, VerificationPlan, run_verification};

/// Timing knobs for a deployment.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub bake_time: Duration,
    pub health_timeout: Duration,
    pub drain_timeout: Duration,
    pub verification: VerificationPlan,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bake_time: config.deployment.bake_time,
            health_timeout: config.deployment.health_timeout,
            drain_timeout: config.deployment.drain_timeout,
            verification: VerificationPlan::from_config(config),
        }
    }
}

fn target_of(handle: Option<&TargetGroupHandle>) -> RuleTarget {
    match handle {
        Some(h) => RuleTarget::Group(h.id.clone()),
        None => RuleTarget::NotFound,
    }
}

/// Runs deployments for one service. One deployment at a time; the
/// orchestrator enforces that.
pub struct DeploymentController<C, R, V> {
    pool: Arc<TargetPoolManager<C>>,
    router: Arc<TrafficRouter<R>>,
    verifier: Arc<V>,
    settings: ControllerSettings,
}

impl<C, R, V> std::fmt::Debug for DeploymentController<C, R, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentController")
            .field("settings", &self.settings)
            .finish()
    }
}

impl<C, R, V> DeploymentController<C, R, V>
where
    C: ComputeOps,
    R: RoutingOps,
    V: Verifier,
{
    pub fn new(
        pool: Arc<TargetPoolManager<C>>,
        router: Arc<TrafficRouter<R>>,
        verifier: Arc<V>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            pool,
            router,
            verifier,
            settings,
        }
    }

    pub fn pool(&self) -> &Arc<TargetPoolManager<C>> {
        &self.pool
    }

    pub fn router(&self) -> &Arc<TrafficRouter<R>> {
        &self.router
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Drive `deployment` from PENDING until it settles. Every state change
    /// is published on `publish` before the entry action runs.
    pub async fn run(
        &self,
        mut deployment: Deployment,
        mut interrupt: Interrupt,
        publish: &watch::Sender<Deployment>,
    ) -> Deployment {
        tracing::info!(
            deployment = %deployment.id,
            service = %deployment.service,
            artifact = %deployment.artifact,
            "deployment started"
        );

        match self.advance(&mut deployment, &mut interrupt, publish).await {
            None => self.complete(&mut deployment, publish).await,
            Some(reason) => self.roll_back(&mut deployment, reason, publish).await,
        }
        deployment
    }

    /// Forward path. Returns the rollback reason, or None once the bake
    /// finished without a fault.
    async fn advance(
        &self,
        d: &mut Deployment,
        interrupt: &mut Interrupt,
        publish: &watch::Sender<Deployment>,
    ) -> Option<RollbackReason> {
        self.enter(d, DeploymentState::Provisioning, publish);
        d.previous = self.pool.production();

        let candidate = match self.pool.register_candidate(&d.artifact).await {
            Ok(handle) => handle,
            Err(e) => return Some(RollbackReason::ProvisionFailed(e.to_string())),
        };
        d.candidate = Some(candidate.clone());
        publish.send_replace(d.clone());

        if let Err(e) = self
            .router
            .point_test(&RuleTarget::Group(candidate.id.clone()))
            .await
        {
            return Some(RollbackReason::RuleUpdateFailed(e.to_string()));
        }

        match self
            .pool
            .wait_until_healthy(&candidate, self.settings.health_timeout, interrupt)
            .await
        {
            Ok(report) => d.health_reports.push(report),
            Err(PoolError::Interrupted(reason)) => return Some(reason.into()),
            Err(e @ PoolError::HealthCheckTimeout { .. }) => {
                return Some(RollbackReason::HealthCheckTimeout(e.to_string()));
            }
            Err(e) => return Some(RollbackReason::HealthCheckFailed(e.to_string())),
        }
        if let Some(reason) = interrupt.reason() {
            return Some(reason.into());
        }

        self.enter(d, DeploymentState::Verifying, publish);
        let verification =
            run_verification(self.verifier.as_ref(), &self.settings.verification, interrupt).await;
        d.verification = verification.outcomes;
        match verification.failure {
            None => {}
            Some(VerificationFailure::Interrupted(reason)) => return Some(reason.into()),
            Some(failure) => return Some(RollbackReason::VerificationFailed(failure.to_string())),
        }
        if let Some(reason) = interrupt.reason() {
            return Some(reason.into());
        }

        self.enter(d, DeploymentState::Shifting, publish);
        // Set before the update: a failed update may still have landed.
        d.shifted = true;
        if let Err(e) = self
            .router
            .point_production(&RuleTarget::Group(candidate.id.clone()))
            .await
        {
            return Some(RollbackReason::RuleUpdateFailed(e.to_string()));
        }
        match self.pool.promote(&candidate) {
            Ok(replaced) => {
                d.promoted = true;
                if replaced.is_some() {
                    d.previous = replaced;
                }
            }
            Err(e) => return Some(RollbackReason::Fault(format!("promotion failed: {e}"))),
        }
        if let Some(reason) = interrupt.reason() {
            return Some(reason.into());
        }

        self.enter(d, DeploymentState::Baking, publish);
        self.bake(d, &candidate, interrupt, publish).await
    }

    /// Watch the new production group until the bake time runs out. Any
    /// regression or interrupt ends the bake with a rollback reason.
    async fn bake(
        &self,
        d: &mut Deployment,
        candidate: &TargetGroupHandle,
        interrupt: &mut Interrupt,
        publish: &watch::Sender<Deployment>,
    ) -> Option<RollbackReason> {
        let deadline = Instant::now() + d.bake_time;
        let interval = self.pool.policy().interval;

        loop {
            tokio::select! {
                biased;
                reason = interrupt.fired() => return Some(reason.into()),
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!(deployment = %d.id, bake_time = ?d.bake_time, "bake finished");
                    return None;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let report = match self.pool.check_group(candidate).await {
                Ok(report) => report,
                Err(e) => return Some(RollbackReason::HealthRegression(e.to_string())),
            };
            let regressed = !report.regressions().is_empty();
            let detail = report.describe_regressions();
            d.health_reports.push(report);
            publish.send_replace(d.clone());

            if regressed {
                tracing::warn!(deployment = %d.id, regressions = %detail, "production health regressed");
                return Some(RollbackReason::HealthRegression(detail));
            }
        }
    }

    async fn complete(&self, d: &mut Deployment, publish: &watch::Sender<Deployment>) {
        let candidate = d.candidate.clone();
        if let Err(e) = self.router.point_test(&target_of(candidate.as_ref())).await {
            self.warn(d, format!("test rule not moved to the new production group: {e}"));
        }
        if let Some(previous) = d.previous.clone() {
            if let Err(e) = self.pool.retire(&previous, self.settings.drain_timeout).await {
                self.warn(d, e.to_string());
            }
        }
        self.enter(d, DeploymentState::Completed, publish);
        tracing::info!(
            deployment = %d.id,
            service = %d.service,
            artifact = %d.artifact,
            "deployment completed"
        );
    }

    async fn roll_back(
        &self,
        d: &mut Deployment,
        reason: RollbackReason,
        publish: &watch::Sender<Deployment>,
    ) {
        tracing::warn!(
            deployment = %d.id,
            service = %d.service,
            from = %d.state,
            %reason,
            "rolling back"
        );
        d.rollback_reason = Some(reason);
        self.enter(d, DeploymentState::RollingBack, publish);

        let previous = target_of(d.previous.as_ref());
        if d.shifted {
            if let Err(e) = self.router.point_production(&previous).await {
                self.intervene(d, format!("production rule not restored: {e}"), publish);
                return;
            }
        }
        if d.promoted {
            if let Some(candidate) = d.candidate.clone() {
                if let Err(e) = self.pool.demote(&candidate) {
                    self.intervene(d, format!("roles not restored: {e}"), publish);
                    return;
                }
            }
        }
        if let Err(e) = self.router.point_test(&previous).await {
            self.intervene(d, format!("test rule not restored: {e}"), publish);
            return;
        }

        if let Some(candidate) = d.candidate.clone() {
            if let Err(e) = self.pool.retire(&candidate, self.settings.drain_timeout).await {
                self.warn(d, e.to_string());
            }
        }
        self.enter(d, DeploymentState::RolledBack, publish);
        tracing::warn!(
            deployment = %d.id,
            service = %d.service,
            reason = ?d.rollback_reason.as_ref().map(ToString::to_string),
            "deployment rolled back"
        );
    }

    /// Finish a deployment that stopped for an operator: a failed rollback,
    /// or a process that died mid-flight. Roles follow whatever the
    /// production rule now says.
    pub async fn resolve(
        &self,
        d: &mut Deployment,
        publish: &watch::Sender<Deployment>,
    ) -> Result<(), RouterError> {
        let production = self.router.current_production_target().await?;
        if d.state != DeploymentState::RollingBack {
            if d.rollback_reason.is_none() {
                d.rollback_reason = d.intervention_required.clone().map(RollbackReason::Fault);
            }
            self.enter(d, DeploymentState::RollingBack, publish);
        }
        let roles = self.pool.reconcile(&production);
        self.router.point_test(&production).await?;

        for slot in Slot::ALL {
            if roles.role(slot) == Role::Retiring {
                let handle = self.pool.group(slot).handle();
                if let Err(e) = self.pool.retire(&handle, self.settings.drain_timeout).await {
                    self.warn(d, e.to_string());
                }
            }
        }

        tracing::warn!(
            deployment = %d.id,
            intervention = ?d.intervention_required,
            production = %production,
            "rollback resolved by operator"
        );
        d.intervention_required = None;
        self.enter(d, DeploymentState::RolledBack, publish);
        Ok(())
    }

    fn enter(&self, d: &mut Deployment, next: DeploymentState, publish: &watch::Sender<Deployment>) {
        let from = d.state;
        if let Err(e) = d.transition(next) {
            tracing::error!(deployment = %d.id, error = %e, "state transition refused");
            return;
        }
        tracing::info!(
            deployment = %d.id,
            service = %d.service,
            %from,
            to = %next,
            "deployment state changed"
        );
        publish.send_replace(d.clone());
    }

    fn intervene(&self, d: &mut Deployment, detail: String, publish: &watch::Sender<Deployment>) {
        tracing::error!(
            deployment = %d.id,
            service = %d.service,
            %detail,
            "rollback failed; manual intervention required"
        );
        d.intervention_required = Some(detail);
        publish.send_replace(d.clone());
    }

    fn warn(&self, d: &mut Deployment, warning: String) {
        tracing::warn!(deployment = %d.id, %warning, "deployment warning");
        d.warnings.push(warning);
    }
}
