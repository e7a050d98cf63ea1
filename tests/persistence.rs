// ABOUTME: Integration tests for deployment persistence and restoring across processes.
// ABOUTME: The orchestrator writes deployments and the pool ledger into the state store.

mod support;

use std::sync::Arc;

use support::{Harness, artifact, service};
use switchyard::deploy::{DeployErrorKind, Deployment, DeploymentState, RollbackReason};
use switchyard::pool::{Role, Slot};
use switchyard::store::StateStore;
use switchyard::substrate::RuleTarget;
use switchyard::verify::ScriptedVerifier;

fn store() -> (tempfile::TempDir, Arc<StateStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::new(dir.path().join("state")));
    (dir, store)
}

/// Test: A finished deployment is saved, archived, and the ledger follows it.
#[tokio::test(start_paused = true)]
async fn completed_deployment_is_persisted() {
    let (_dir, store) = store();
    let h = Harness::with_store(ScriptedVerifier::always(true), store.clone());

    let d = h.deploy("v2").await;

    let current = store.load_deployment(&h.service).await.unwrap().unwrap();
    assert_eq!(current, d);
    let archived = store.archived_deployments(&h.service).await.unwrap();
    assert_eq!(archived, vec![d]);

    let ledger = store.load_ledger(&h.service).await.unwrap().unwrap();
    assert_eq!(ledger.group(Slot::Green).role, Role::Production);
    assert_eq!(ledger.group(Slot::Blue).role, Role::Idle);
}

/// Test: Archive history keeps every settled deployment in start order.
#[tokio::test(start_paused = true)]
async fn archive_keeps_history() {
    let (_dir, store) = store();
    let h = Harness::with_store(ScriptedVerifier::new([false]), store.clone());

    let first = h.deploy("v2").await;
    let second = h.deploy("v3").await;

    let archived = store.archived_deployments(&h.service).await.unwrap();
    let ids: Vec<_> = archived.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    assert_eq!(archived[0].state, DeploymentState::RolledBack);
    assert_eq!(archived[1].state, DeploymentState::Completed);
}

/// Test: A deployment in flight is visible in the store before it settles.
#[tokio::test(start_paused = true)]
async fn in_flight_state_is_saved() {
    let (_dir, store) = store();
    let h = Harness::with_store(ScriptedVerifier::always(true), store.clone());

    let handle = h.orchestrator.trigger(&h.service, artifact("v2")).unwrap();
    handle
        .subscribe()
        .wait_for(|d| d.state == DeploymentState::Baking)
        .await
        .unwrap();
    // Let the writer catch up with the latest state.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    let saved = store.load_deployment(&h.service).await.unwrap().unwrap();
    assert_eq!(saved.id, handle.id());
    assert_eq!(saved.state, DeploymentState::Baking);

    handle.finish().await;
}

/// Test: A restored unsettled deployment blocks new triggers.
#[tokio::test]
async fn restored_deployment_blocks_trigger() {
    let h = Harness::new(ScriptedVerifier::always(true));
    let mut d = Deployment::new(service(), artifact("v2"), std::time::Duration::from_secs(300));
    d.transition(DeploymentState::Provisioning).unwrap();
    h.orchestrator.restore(d.clone()).unwrap();

    let err = h
        .orchestrator
        .trigger(&h.service, artifact("v3"))
        .unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::DeploymentInProgress);
    assert_eq!(h.orchestrator.status(&h.service).unwrap(), d);
}

/// Test: An abandoned deployment is resolved against the production rule.
#[tokio::test(start_paused = true)]
async fn abandoned_deployment_is_resolved() {
    let (_dir, store) = store();
    let h = Harness::with_store(ScriptedVerifier::always(true), store.clone());
    let mut d = Deployment::new(service(), artifact("v2"), std::time::Duration::from_secs(300));
    d.transition(DeploymentState::Provisioning).unwrap();
    d.intervention_required =
        Some("the deploying process exited before the deployment settled".to_string());
    h.orchestrator.restore(d.clone()).unwrap();

    let resolved = h.orchestrator.resolve(&h.service).await.unwrap();

    assert_eq!(resolved.id, d.id);
    assert_eq!(resolved.state, DeploymentState::RolledBack);
    assert!(resolved.intervention_required.is_none());
    assert!(matches!(
        resolved.rollback_reason,
        Some(RollbackReason::Fault(_))
    ));
    assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
    assert_eq!(h.roles().role(Slot::Blue), Role::Production);

    let saved = store.load_deployment(&h.service).await.unwrap().unwrap();
    assert_eq!(saved.state, DeploymentState::RolledBack);
    assert_eq!(store.archived_deployments(&h.service).await.unwrap().len(), 1);
}

/// Test: Rollback markers are consumed once.
#[tokio::test]
async fn rollback_request_is_taken_once() {
    let (_dir, store) = store();
    let d = Deployment::new(service(), artifact("v2"), std::time::Duration::from_secs(300));

    store.request_rollback(&d.service, &d.id).await.unwrap();

    assert_eq!(
        store.take_rollback_request(&d.service).await.unwrap(),
        Some(d.id.clone())
    );
    assert_eq!(store.take_rollback_request(&d.service).await.unwrap(), None);
}

/// Test: Missing state reads as empty rather than failing.
#[tokio::test]
async fn empty_store_reads_as_nothing() {
    let (_dir, store) = store();

    assert!(store.load_deployment(&service()).await.unwrap().is_none());
    assert!(store.load_ledger(&service()).await.unwrap().is_none());
    assert!(store.archived_deployments(&service()).await.unwrap().is_empty());
    assert!(store.runs().await.unwrap().is_empty());
}
