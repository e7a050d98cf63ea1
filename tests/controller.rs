// ABOUTME: Integration tests for the deployment controller over the in-memory substrate.
// ABOUTME: Covers the happy path, verification failure, bake faults, and concurrent triggers.

mod support;

use std::time::Duration;

use support::{Harness, artifact};
use switchyard::deploy::{DeployErrorKind, DeploymentState, RollbackReason};
use switchyard::pool::{Role, Slot};
use switchyard::substrate::{ProbeStatus, RuleTarget};
use switchyard::verify::ScriptedVerifier;

mod happy_path {
    use super::*;

    /// Test: 3 passing probes and a clean 5 minute bake complete the deployment.
    #[tokio::test(start_paused = true)]
    async fn passing_verification_and_bake_completes() {
        let h = Harness::new(ScriptedVerifier::always(true));

        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::Completed);
        assert!(d.rollback_reason.is_none());
        assert_eq!(d.verification.len(), 3);
        assert!(d.verification.iter().all(|p| p.passed));
        assert!(d.finished_at.is_some());

        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.green.clone())));
        assert_eq!(h.test_target(), Some(RuleTarget::Group(h.green.clone())));

        let roles = h.roles();
        assert_eq!(roles.role(Slot::Green), Role::Production);
        assert_eq!(roles.role(Slot::Blue), Role::Idle);
        assert_eq!(h.compute.running_artifact(&h.v1), 0, "old group retired");
        assert_eq!(h.compute.running_artifact(&artifact("v2")), 2);
    }

    /// Test: The state history is the full forward path.
    #[tokio::test(start_paused = true)]
    async fn history_follows_forward_path() {
        let h = Harness::new(ScriptedVerifier::always(true));

        let d = h.deploy("v2").await;

        let visited: Vec<_> = d.history.iter().map(|t| t.to).collect();
        assert_eq!(
            visited,
            vec![
                DeploymentState::Provisioning,
                DeploymentState::Verifying,
                DeploymentState::Shifting,
                DeploymentState::Baking,
                DeploymentState::Completed,
            ]
        );
    }

    /// Test: The production rule changes exactly once on the way forward.
    #[tokio::test(start_paused = true)]
    async fn production_rule_updated_once() {
        let h = Harness::new(ScriptedVerifier::always(true));

        h.deploy("v2").await;

        assert_eq!(
            h.production_updates(),
            vec![RuleTarget::Group(h.green.clone())]
        );
    }

    /// Test: Consecutive deployments alternate between the two slots.
    #[tokio::test(start_paused = true)]
    async fn consecutive_deployments_alternate_slots() {
        let h = Harness::new(ScriptedVerifier::always(true));

        assert_eq!(h.deploy("v2").await.state, DeploymentState::Completed);
        let d = h.deploy("v3").await;

        assert_eq!(d.state, DeploymentState::Completed);
        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
        assert_eq!(h.roles().role(Slot::Blue), Role::Production);
        assert_eq!(h.roles().role(Slot::Green), Role::Idle);
        assert_eq!(h.compute.running_artifact(&artifact("v3")), 2);
        assert_eq!(h.compute.running_artifact(&artifact("v2")), 0);
    }

    /// Test: The deployment takes at least the bake time to complete.
    #[tokio::test(start_paused = true)]
    async fn bake_lasts_bake_time() {
        let h = Harness::new(ScriptedVerifier::always(true));

        let started = tokio::time::Instant::now();
        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::Completed);
        assert!(started.elapsed() >= Duration::from_secs(5 * 60));
        assert!(
            d.health_reports.len() > 1,
            "production group checked during the bake"
        );
    }
}

mod verification_failure {
    use super::*;

    /// Test: A failed second probe rolls back without touching production.
    #[tokio::test(start_paused = true)]
    async fn failed_probe_rolls_back() {
        let h = Harness::new(ScriptedVerifier::new([true, false, true]));

        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::RolledBack);
        assert!(matches!(
            d.rollback_reason,
            Some(RollbackReason::VerificationFailed(_))
        ));
        assert_eq!(d.verification.len(), 2, "verification stops at first failure");
        assert!(!d.shifted);

        assert!(h.production_updates().is_empty(), "production never repointed");
        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
        assert_eq!(h.test_target(), Some(RuleTarget::Group(h.blue.clone())));

        let roles = h.roles();
        assert_eq!(roles.role(Slot::Blue), Role::Production);
        assert_eq!(roles.role(Slot::Green), Role::Idle);
        assert_eq!(h.compute.running_artifact(&artifact("v2")), 0, "candidate retired");
        assert_eq!(h.compute.running_artifact(&h.v1), 2);
    }

    /// Test: Probes too slow for the window roll back.
    #[tokio::test(start_paused = true)]
    async fn window_expiry_rolls_back() {
        let h = Harness::new(ScriptedVerifier::always(true).with_delay(Duration::from_secs(20)));

        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::RolledBack);
        match d.rollback_reason {
            Some(RollbackReason::VerificationFailed(detail)) => {
                assert!(detail.contains("window"), "unexpected detail: {detail}");
            }
            other => panic!("unexpected reason: {other:?}"),
        }
        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
    }
}

mod provisioning_failure {
    use super::*;

    /// Test: Endpoints that never turn healthy time out and roll back.
    #[tokio::test(start_paused = true)]
    async fn health_timeout_rolls_back() {
        let h = Harness::new(ScriptedVerifier::always(true));
        h.compute.script(
            &artifact("v2"),
            vec![ProbeStatus::Failing("connection refused".to_string())],
        );

        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::RolledBack);
        assert!(matches!(
            d.rollback_reason,
            Some(RollbackReason::HealthCheckTimeout(_))
        ));
        assert!(d.verification.is_empty(), "never reached verification");
        assert_eq!(h.roles().role(Slot::Blue), Role::Production);
        assert_eq!(h.compute.running_artifact(&artifact("v2")), 0);
    }

    /// Test: A terminal signal fails fast instead of waiting for the timeout.
    #[tokio::test(start_paused = true)]
    async fn terminal_signal_fails_fast() {
        let h = Harness::new(ScriptedVerifier::always(true));
        h.compute.script(
            &artifact("v2"),
            vec![ProbeStatus::Terminal("crash loop".to_string())],
        );

        let started = tokio::time::Instant::now();
        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::RolledBack);
        assert!(matches!(
            d.rollback_reason,
            Some(RollbackReason::HealthCheckFailed(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    /// Test: No capacity for the candidate rolls back with nothing to retire.
    #[tokio::test(start_paused = true)]
    async fn launch_failure_rolls_back() {
        let h = Harness::new(ScriptedVerifier::always(true));
        // Blue already runs 2 endpoints; the candidate needs 2 more.
        h.compute.set_capacity(3);

        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::RolledBack);
        assert!(matches!(
            d.rollback_reason,
            Some(RollbackReason::ProvisionFailed(_))
        ));
        assert!(d.candidate.is_none());
        assert_eq!(h.roles().role(Slot::Green), Role::Idle);
        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
        assert_eq!(h.compute.running_artifact(&h.v1), 2);
    }
}

mod bake_faults {
    use super::*;

    /// Test: A fault signal two minutes into the bake rolls production back.
    #[tokio::test(start_paused = true)]
    async fn fault_during_bake_rolls_back() {
        let h = Harness::new(ScriptedVerifier::always(true));

        let handle = h.orchestrator.trigger(&h.service, artifact("v2")).unwrap();
        let mut status = handle.subscribe();
        status
            .wait_for(|d| d.state == DeploymentState::Baking)
            .await
            .expect("deployment should reach BAKING");
        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.green.clone())));

        tokio::time::sleep(Duration::from_secs(120)).await;
        h.orchestrator
            .report_fault(&h.service, "5xx alarm")
            .expect("fault accepted while baking");

        let d = handle.finish().await;
        assert_eq!(d.state, DeploymentState::RolledBack);
        assert_eq!(
            d.rollback_reason,
            Some(RollbackReason::Fault("5xx alarm".to_string()))
        );
        assert!(d.shifted);

        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
        assert_eq!(h.test_target(), Some(RuleTarget::Group(h.blue.clone())));
        assert_eq!(
            h.production_updates(),
            vec![
                RuleTarget::Group(h.green.clone()),
                RuleTarget::Group(h.blue.clone())
            ]
        );

        let roles = h.roles();
        assert_eq!(roles.role(Slot::Blue), Role::Production);
        assert_eq!(roles.role(Slot::Green), Role::Idle);
        assert_eq!(h.compute.running_artifact(&h.v1), 2, "previous group kept");
        assert_eq!(h.compute.running_artifact(&artifact("v2")), 0);
    }

    /// Test: Endpoints regressing while baking trigger a rollback.
    #[tokio::test(start_paused = true)]
    async fn health_regression_during_bake_rolls_back() {
        let h = Harness::new(ScriptedVerifier::always(true));

        let handle = h.orchestrator.trigger(&h.service, artifact("v2")).unwrap();
        handle
            .subscribe()
            .wait_for(|d| d.state == DeploymentState::Baking)
            .await
            .unwrap();
        h.compute.set_status(
            &artifact("v2"),
            ProbeStatus::Failing("HTTP 500".to_string()),
        );

        let d = handle.finish().await;
        assert_eq!(d.state, DeploymentState::RolledBack);
        assert!(matches!(
            d.rollback_reason,
            Some(RollbackReason::HealthRegression(_))
        ));
        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
    }

    /// Test: One failed check while baking rolls back, even below the
    /// unhealthy threshold and even if the next check passes.
    #[tokio::test(start_paused = true)]
    async fn single_failed_check_during_bake_rolls_back() {
        let h = Harness::new(ScriptedVerifier::always(true));
        // Two passes make the candidate healthy; the first bake check fails.
        h.compute.script(
            &artifact("v2"),
            vec![
                ProbeStatus::Passing,
                ProbeStatus::Passing,
                ProbeStatus::Failing("HTTP 500".to_string()),
                ProbeStatus::Passing,
            ],
        );

        let d = h.deploy("v2").await;

        assert_eq!(d.state, DeploymentState::RolledBack);
        match &d.rollback_reason {
            Some(RollbackReason::HealthRegression(detail)) => {
                assert!(detail.contains("HTTP 500"), "{detail}")
            }
            other => panic!("unexpected rollback reason: {other:?}"),
        }
        assert!(d.history.iter().any(|t| t.to == DeploymentState::Baking));
        assert_eq!(h.production_target(), Some(RuleTarget::Group(h.blue.clone())));
        assert_eq!(
            h.production_updates(),
            vec![
                RuleTarget::Group(h.green.clone()),
                RuleTarget::Group(h.blue.clone()),
            ]
        );
        assert_eq!(h.roles().role(Slot::Blue), Role::Production);
    }

    /// Test: Fault signals outside BAKING are rejected.
    #[tokio::test(start_paused = true)]
    async fn fault_outside_bake_rejected() {
        let h = Harness::new(ScriptedVerifier::always(true));

        let handle = h.orchestrator.trigger(&h.service, artifact("v2")).unwrap();
        handle
            .subscribe()
            .wait_for(|d| d.state == DeploymentState::Verifying)
            .await
            .unwrap();

        let err = h.orchestrator.report_fault(&h.service, "alarm").unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::InvalidRequest);

        assert_eq!(handle.finish().await.state, DeploymentState::Completed);
    }
}

mod single_deployment {
    use super::*;

    /// Test: A second trigger while VERIFYING is rejected and the first goes on.
    #[tokio::test(start_paused = true)]
    async fn concurrent_trigger_rejected() {
        let h = Harness::new(ScriptedVerifier::always(true));

        let first = h.orchestrator.trigger(&h.service, artifact("v2")).unwrap();
        first
            .subscribe()
            .wait_for(|d| d.state == DeploymentState::Verifying)
            .await
            .unwrap();

        let err = h
            .orchestrator
            .trigger(&h.service, artifact("v3"))
            .unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::DeploymentInProgress);
        assert!(err.to_string().contains(first.id().as_str()));

        let d = first.finish().await;
        assert_eq!(d.state, DeploymentState::Completed);
        assert_eq!(d.artifact, artifact("v2"));
        assert_eq!(h.compute.launches().len(), 1, "second artifact never launched");
    }

    /// Test: A new trigger is accepted once the previous deployment settled.
    #[tokio::test(start_paused = true)]
    async fn trigger_accepted_after_terminal() {
        let h = Harness::new(ScriptedVerifier::new([false]));

        assert_eq!(h.deploy("v2").await.state, DeploymentState::RolledBack);
        assert_eq!(h.deploy("v3").await.state, DeploymentState::Completed);
    }
}
