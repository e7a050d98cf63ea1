// ABOUTME: Scriptable in-memory providers for compute, routing, source, and build.
// ABOUTME: Drive the orchestrator and pipeline deterministically without external systems.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use super::build::{BuildError, BuildOps, BuiltArtifact};
use super::compute::{ComputeError, ComputeOps, LaunchSpec, ProbeStatus};
use super::routing::{RoutingError, RoutingOps, RuleTarget};
use super::source::{SourceBundle, SourceError, SourceOps};
use crate::config::HealthCheckPolicy;
use crate::types::{ArtifactRef, EndpointId, RevisionId, RuleId, TriggerEvent};

/// Health check answers for the endpoints of one artifact. The i-th check of
/// an endpoint gets the i-th entry; the last entry repeats.
#[derive(Debug, Clone)]
struct ProbeScript(Vec<ProbeStatus>);

impl ProbeScript {
    fn answer(&self, check: usize) -> ProbeStatus {
        self.0
            .get(check)
            .or_else(|| self.0.last())
            .cloned()
            .unwrap_or(ProbeStatus::Passing)
    }
}

#[derive(Debug, Default)]
struct ComputeState {
    next_id: u64,
    capacity: Option<usize>,
    running: Vec<(EndpointId, ArtifactRef)>,
    scripts: HashMap<String, ProbeScript>,
    overrides: HashMap<String, ProbeStatus>,
    checks: HashMap<EndpointId, usize>,
    launches: Vec<LaunchSpec>,
    terminated: Vec<EndpointId>,
    fail_terminate: bool,
}

/// In-memory compute substrate. Endpoints pass health checks unless scripted.
#[derive(Debug, Default)]
pub struct InMemoryCompute {
    state: Mutex<ComputeState>,
}

impl InMemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of endpoints that may run at once.
    pub fn with_capacity(self, endpoints: usize) -> Self {
        self.set_capacity(endpoints);
        self
    }

    pub fn set_capacity(&self, endpoints: usize) {
        self.state.lock().capacity = Some(endpoints);
    }

    /// Script the health check answers for endpoints running `artifact`.
    pub fn script(&self, artifact: &ArtifactRef, answers: Vec<ProbeStatus>) {
        self.state
            .lock()
            .scripts
            .insert(artifact.to_string(), ProbeScript(answers));
    }

    /// From now on every check of `artifact`'s endpoints returns `status`.
    pub fn set_status(&self, artifact: &ArtifactRef, status: ProbeStatus) {
        self.state
            .lock()
            .overrides
            .insert(artifact.to_string(), status);
    }

    pub fn fail_terminate(&self, fail: bool) {
        self.state.lock().fail_terminate = fail;
    }

    /// Endpoints currently running, with their artifact.
    pub fn running(&self) -> Vec<(EndpointId, ArtifactRef)> {
        self.state.lock().running.clone()
    }

    pub fn running_artifact(&self, artifact: &ArtifactRef) -> usize {
        self.state
            .lock()
            .running
            .iter()
            .filter(|(_, a)| a == artifact)
            .count()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.state.lock().launches.clone()
    }

    pub fn terminated(&self) -> Vec<EndpointId> {
        self.state.lock().terminated.clone()
    }

    /// Start endpoints outside of any deployment, as an operator would.
    pub fn seed(&self, artifact: &ArtifactRef, count: usize) -> Vec<EndpointId> {
        let mut state = self.state.lock();
        (0..count)
            .map(|_| {
                state.next_id += 1;
                let id = EndpointId::new(format!("10.0.0.{}:80", state.next_id));
                state.running.push((id.clone(), artifact.clone()));
                id
            })
            .collect()
    }
}

#[async_trait]
impl ComputeOps for InMemoryCompute {
    async fn launch_endpoints(&self, spec: &LaunchSpec) -> Result<Vec<EndpointId>, ComputeError> {
        let mut state = self.state.lock();
        state.launches.push(spec.clone());
        let wanted = spec.count as usize;
        if let Some(capacity) = state.capacity {
            let free = capacity.saturating_sub(state.running.len());
            if free < wanted {
                return Err(ComputeError::InsufficientCapacity(format!(
                    "{wanted} endpoints requested, {free} available"
                )));
            }
        }
        drop(state);
        Ok(self.seed(&spec.artifact, wanted))
    }

    async fn terminate_endpoints(
        &self,
        endpoints: &[EndpointId],
        _drain_timeout: Duration,
    ) -> Result<(), ComputeError> {
        let mut state = self.state.lock();
        if state.fail_terminate {
            return Err(ComputeError::TerminateFailed(
                "terminate refused by provider".to_string(),
            ));
        }
        let doomed: HashSet<&EndpointId> = endpoints.iter().collect();
        state.running.retain(|(id, _)| !doomed.contains(id));
        state.terminated.extend(endpoints.iter().cloned());
        Ok(())
    }

    async fn health_check(&self, endpoint: &EndpointId, _policy: &HealthCheckPolicy) -> ProbeStatus {
        let mut state = self.state.lock();
        let Some(artifact) = state
            .running
            .iter()
            .find(|(id, _)| id == endpoint)
            .map(|(_, a)| a.to_string())
        else {
            return ProbeStatus::Terminal(format!("{endpoint} is not running"));
        };

        let check = {
            let count = state.checks.entry(endpoint.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if let Some(status) = state.overrides.get(&artifact) {
            return status.clone();
        }
        state
            .scripts
            .get(&artifact)
            .map(|script| script.answer(check))
            .unwrap_or(ProbeStatus::Passing)
    }
}

#[derive(Debug, Default)]
struct RoutingState {
    rules: HashMap<RuleId, RuleTarget>,
    history: Vec<(RuleId, RuleTarget)>,
    failing_sets: HashMap<RuleId, u32>,
}

/// In-memory routing layer holding a map of rules.
#[derive(Debug, Default)]
pub struct InMemoryRouting {
    state: Mutex<RoutingState>,
}

impl InMemoryRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(self, rule: RuleId, target: RuleTarget) -> Self {
        self.state.lock().rules.insert(rule, target);
        self
    }

    /// Fail the next `count` updates of `rule`.
    pub fn fail_next_sets(&self, rule: &RuleId, count: u32) {
        self.state.lock().failing_sets.insert(rule.clone(), count);
    }

    pub fn target(&self, rule: &RuleId) -> Option<RuleTarget> {
        self.state.lock().rules.get(rule).cloned()
    }

    /// Every successful update, in order.
    pub fn history(&self) -> Vec<(RuleId, RuleTarget)> {
        self.state.lock().history.clone()
    }
}

#[async_trait]
impl RoutingOps for InMemoryRouting {
    async fn set_rule_target(&self, rule: &RuleId, target: &RuleTarget) -> Result<(), RoutingError> {
        let mut state = self.state.lock();
        if !state.rules.contains_key(rule) {
            return Err(RoutingError::UnknownRule(rule.to_string()));
        }
        if let Some(remaining) = state.failing_sets.get_mut(rule) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RoutingError::Unavailable(format!("update of {rule} failed")));
            }
        }
        state.rules.insert(rule.clone(), target.clone());
        state.history.push((rule.clone(), target.clone()));
        Ok(())
    }

    async fn get_rule_target(&self, rule: &RuleId) -> Result<RuleTarget, RoutingError> {
        self.state
            .lock()
            .rules
            .get(rule)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownRule(rule.to_string()))
    }
}

/// In-memory source control; every revision exists unless marked missing.
#[derive(Debug, Default)]
pub struct InMemorySource {
    missing: Mutex<HashSet<RevisionId>>,
    fetched: Mutex<Vec<TriggerEvent>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_missing(&self, revision: &RevisionId) {
        self.missing.lock().insert(revision.clone());
    }

    pub fn fetched(&self) -> Vec<TriggerEvent> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl SourceOps for InMemorySource {
    async fn fetch(&self, event: &TriggerEvent) -> Result<SourceBundle, SourceError> {
        if self.missing.lock().contains(&event.revision) {
            return Err(SourceError::RevisionNotFound(event.revision.to_string()));
        }
        self.fetched.lock().push(event.clone());
        Ok(SourceBundle {
            revision: event.revision.clone(),
            branch: event.branch.clone(),
            path: PathBuf::from("/src").join(event.revision.as_str()),
        })
    }
}

/// In-memory build toolchain producing digest-pinned artifacts.
///
/// The digest is derived from the revision (and a per-revision salt), so
/// rebuilding a revision is reproducible unless the salt changes.
#[derive(Debug, Default)]
pub struct InMemoryBuild {
    failures: Mutex<HashMap<RevisionId, BuildError>>,
    salts: Mutex<HashMap<RevisionId, u64>>,
    builds: Mutex<Vec<RevisionId>>,
}

impl InMemoryBuild {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, revision: &RevisionId, error: BuildError) {
        self.failures.lock().insert(revision.clone(), error);
    }

    /// Make the next build of `revision` produce different content.
    pub fn perturb(&self, revision: &RevisionId) {
        *self.salts.lock().entry(revision.clone()).or_insert(0) += 1;
    }

    pub fn builds(&self) -> Vec<RevisionId> {
        self.builds.lock().clone()
    }

    /// Digest a build of `revision` currently produces.
    pub fn digest_for(&self, revision: &RevisionId) -> String {
        let salt = self.salts.lock().get(revision).copied().unwrap_or(0);
        let mut hex = String::new();
        for round in 0..4u64 {
            let mut hasher = DefaultHasher::new();
            (revision.as_str(), salt, round).hash(&mut hasher);
            hex.push_str(&format!("{:016x}", hasher.finish()));
        }
        format!("sha256:{hex}")
    }
}

#[async_trait]
impl BuildOps for InMemoryBuild {
    async fn build(
        &self,
        bundle: &SourceBundle,
        repository: &str,
    ) -> Result<BuiltArtifact, BuildError> {
        self.builds.lock().push(bundle.revision.clone());
        if let Some(error) = self.failures.lock().get(&bundle.revision) {
            return Err(error.clone());
        }
        let reference = format!("{repository}@{}", self.digest_for(&bundle.revision));
        let artifact = ArtifactRef::parse(&reference)
            .map_err(|e| BuildError::InvalidArtifact(e.to_string()))?;
        Ok(BuiltArtifact {
            artifact,
            log: format!("built {} from {}", reference, bundle.path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ArtifactRef {
        ArtifactRef::parse("httpd:2.4").unwrap()
    }

    #[tokio::test]
    async fn scripted_answers_repeat_last_entry() {
        let compute = InMemoryCompute::new();
        let ids = compute.seed(&artifact(), 1);
        compute.script(
            &artifact(),
            vec![ProbeStatus::Failing("starting".into()), ProbeStatus::Passing],
        );
        let policy = HealthCheckPolicy::default();
        assert!(!compute.health_check(&ids[0], &policy).await.is_passing());
        assert!(compute.health_check(&ids[0], &policy).await.is_passing());
        assert!(compute.health_check(&ids[0], &policy).await.is_passing());
    }

    #[tokio::test]
    async fn routing_fails_scripted_updates_then_recovers() {
        let rule = RuleId::new("apache-production-rule");
        let routing = InMemoryRouting::new().with_rule(rule.clone(), RuleTarget::NotFound);
        routing.fail_next_sets(&rule, 1);
        let target = RuleTarget::Group(crate::types::TargetGroupId::new("blue"));
        assert!(routing.set_rule_target(&rule, &target).await.is_err());
        routing.set_rule_target(&rule, &target).await.unwrap();
        assert_eq!(routing.target(&rule), Some(target));
    }

    #[test]
    fn build_digest_is_stable_until_perturbed() {
        let build = InMemoryBuild::new();
        let rev = RevisionId::new("abc123").unwrap();
        let first = build.digest_for(&rev);
        assert_eq!(first, build.digest_for(&rev));
        build.perturb(&rev);
        assert_ne!(first, build.digest_for(&rev));
    }
}
