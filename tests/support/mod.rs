// ABOUTME: Test support utilities.
// ABOUTME: Builds an orchestrator over the in-memory substrate with blue serving v1.

// Each test binary only uses some of these helpers.
#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use switchyard::config::HealthCheckPolicy;
use switchyard::config::Protocol;
use switchyard::deploy::{ControllerSettings, Deployment, DeploymentController, Orchestrator};
use switchyard::pool::{
    EndpointHealth, PoolLedger, PoolSettings, RegisteredEndpoint, Role, RoleAssignment, Slot,
    TargetPoolManager,
};
use switchyard::router::{RouterSettings, TrafficRouter};
use switchyard::store::StateStore;
use switchyard::substrate::RuleTarget;
use switchyard::substrate::memory::{InMemoryCompute, InMemoryRouting};
use switchyard::types::{ArtifactRef, RuleId, ServiceName, TargetGroupId};
use switchyard::verify::{ScriptedVerifier, VerificationPlan};

pub type MemOrchestrator = Orchestrator<InMemoryCompute, InMemoryRouting, ScriptedVerifier>;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("switchyard=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn service() -> ServiceName {
    ServiceName::new("apache").unwrap()
}

pub fn artifact(tag: &str) -> ArtifactRef {
    ArtifactRef::parse(&format!("registry.example.com/apache:{tag}")).unwrap()
}

/// Checks every 10s; two passes make an endpoint healthy, two failures unhealthy.
pub fn policy() -> HealthCheckPolicy {
    HealthCheckPolicy {
        interval: Duration::from_secs(10),
        timeout: Duration::from_secs(5),
        healthy_threshold: 2,
        unhealthy_threshold: 2,
        ..Default::default()
    }
}

/// 3 probes in a 30s window, 5 minute bake.
pub fn controller_settings() -> ControllerSettings {
    ControllerSettings {
        bake_time: Duration::from_secs(5 * 60),
        health_timeout: Duration::from_secs(5 * 60),
        drain_timeout: Duration::from_secs(30),
        verification: VerificationPlan {
            probes: 3,
            window: Duration::from_secs(30),
            interval: Duration::from_secs(5),
        },
    }
}

pub struct Harness {
    pub service: ServiceName,
    pub compute: Arc<InMemoryCompute>,
    pub routing: Arc<InMemoryRouting>,
    pub orchestrator: Arc<MemOrchestrator>,
    pub blue: TargetGroupId,
    pub green: TargetGroupId,
    pub production_rule: RuleId,
    pub test_rule: RuleId,
    pub v1: ArtifactRef,
}

impl Harness {
    pub fn new(verifier: ScriptedVerifier) -> Self {
        Self::build(verifier, controller_settings(), None)
    }

    pub fn with_settings(verifier: ScriptedVerifier, settings: ControllerSettings) -> Self {
        Self::build(verifier, settings, None)
    }

    pub fn with_store(verifier: ScriptedVerifier, store: Arc<StateStore>) -> Self {
        Self::build(verifier, controller_settings(), Some(store))
    }

    fn build(
        verifier: ScriptedVerifier,
        settings: ControllerSettings,
        store: Option<Arc<StateStore>>,
    ) -> Self {
        let service = service();
        let v1 = artifact("v1");
        let blue = TargetGroupId::new("apache-blue-target-group");
        let green = TargetGroupId::new("apache-green-target-group");
        let production_rule = RuleId::new("apache-production-rule");
        let test_rule = RuleId::new("apache-test-rule");

        let compute = Arc::new(InMemoryCompute::new());
        let mut ledger = PoolLedger::new([blue.clone(), green.clone()]);
        {
            let group = ledger.group_mut(Slot::Blue);
            group.role = Role::Production;
            group.artifact = Some(v1.clone());
            group.endpoints = compute
                .seed(&v1, 2)
                .into_iter()
                .map(|id| RegisteredEndpoint {
                    health: EndpointHealth::Healthy,
                    ..RegisteredEndpoint::new(id)
                })
                .collect();
        }

        let routing = Arc::new(
            InMemoryRouting::new()
                .with_rule(production_rule.clone(), RuleTarget::Group(blue.clone()))
                .with_rule(test_rule.clone(), RuleTarget::Group(blue.clone())),
        );

        let pool = Arc::new(TargetPoolManager::from_ledger(
            compute.clone(),
            PoolSettings {
                service: service.clone(),
                desired_count: 2,
                port: 80,
                protocol: Protocol::Http,
                health_check: policy(),
                tags: Default::default(),
            },
            ledger,
        ));
        let router = Arc::new(TrafficRouter::new(
            routing.clone(),
            RouterSettings {
                production_rule: production_rule.clone(),
                test_rule: test_rule.clone(),
                retries: 2,
                backoff: Duration::from_secs(1),
            },
        ));

        let orchestrator = match store {
            Some(store) => MemOrchestrator::new().with_store(store),
            None => MemOrchestrator::new(),
        };
        orchestrator.register(DeploymentController::new(
            pool,
            router,
            Arc::new(verifier),
            settings,
        ));

        Self {
            service,
            compute,
            routing,
            orchestrator: Arc::new(orchestrator),
            blue,
            green,
            production_rule,
            test_rule,
            v1,
        }
    }

    pub fn production_target(&self) -> Option<RuleTarget> {
        self.routing.target(&self.production_rule)
    }

    pub fn test_target(&self) -> Option<RuleTarget> {
        self.routing.target(&self.test_rule)
    }

    pub fn roles(&self) -> RoleAssignment {
        self.orchestrator.pool(&self.service).unwrap().roles()
    }

    /// Every update of the production rule, in order.
    pub fn production_updates(&self) -> Vec<RuleTarget> {
        self.routing
            .history()
            .into_iter()
            .filter(|(rule, _)| *rule == self.production_rule)
            .map(|(_, target)| target)
            .collect()
    }

    pub async fn deploy(&self, tag: &str) -> Deployment {
        self.orchestrator
            .trigger(&self.service, artifact(tag))
            .unwrap()
            .finish()
            .await
    }
}
