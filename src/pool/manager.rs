// ABOUTME: Target pool manager: launches candidates, waits for health, and swaps roles.
// ABOUTME: All role changes happen under one write lock, so readers never see a torn mapping.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::error::PoolError;
use super::group::{
    PoolLedger, Promotion, RegisteredEndpoint, Role, RoleAssignment, Slot, TargetGroup,
    TargetGroupHandle,
};
use super::report::{EndpointReport, HealthReport};
use crate::config::{Config, HealthCheckPolicy, Protocol};
use crate::interrupt::Interrupt;
use crate::substrate::{ComputeOps, LaunchSpec, ProbeStatus, RuleTarget};
use crate::types::{ArtifactRef, ServiceName};

/// How candidates are launched and checked.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub service: ServiceName,
    pub desired_count: u32,
    pub port: u16,
    pub protocol: Protocol,
    pub health_check: HealthCheckPolicy,
    pub tags: BTreeMap<String, String>,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            service: config.service.clone(),
            desired_count: config.desired_count,
            port: config.container_port,
            protocol: config.protocol,
            health_check: config.target_groups.health_check.clone(),
            tags: config.tags.clone(),
        }
    }
}

fn ensure_current(group: &TargetGroup, handle: &TargetGroupHandle) -> Result<(), PoolError> {
    if group.generation != handle.generation {
        return Err(PoolError::StaleHandle {
            slot: handle.slot,
            held: handle.generation,
            current: group.generation,
        });
    }
    Ok(())
}

/// Owns the two target group slots of one service.
pub struct TargetPoolManager<C> {
    compute: Arc<C>,
    settings: PoolSettings,
    ledger: RwLock<PoolLedger>,
}

impl<C> std::fmt::Debug for TargetPoolManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetPoolManager")
            .field("service", &self.settings.service)
            .field("roles", &self.ledger.read().roles())
            .finish()
    }
}

impl<C: ComputeOps> TargetPoolManager<C> {
    pub fn from_ledger(compute: Arc<C>, settings: PoolSettings, ledger: PoolLedger) -> Self {
        Self {
            compute,
            settings,
            ledger: RwLock::new(ledger),
        }
    }

    pub fn service(&self) -> &ServiceName {
        &self.settings.service
    }

    pub fn policy(&self) -> &HealthCheckPolicy {
        &self.settings.health_check
    }

    /// Copy of the full slot state, for persistence.
    pub fn ledger(&self) -> PoolLedger {
        self.ledger.read().clone()
    }

    pub fn roles(&self) -> RoleAssignment {
        self.ledger.read().roles()
    }

    pub fn group(&self, slot: Slot) -> TargetGroup {
        self.ledger.read().group(slot).clone()
    }

    /// Handle of the group currently serving production, if any.
    pub fn production(&self) -> Option<TargetGroupHandle> {
        self.ledger.read().production().map(TargetGroup::handle)
    }

    /// Take the slot not serving production, mark it staging, and launch
    /// `desired_count` endpoints running `artifact` into it.
    pub async fn register_candidate(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<TargetGroupHandle, PoolError> {
        let (handle, leftovers) = {
            let mut ledger = self.ledger.write();
            let slot = match ledger.roles().production() {
                Some(production) => production.other(),
                None => Slot::ALL
                    .into_iter()
                    .find(|s| ledger.group(*s).role == Role::Idle)
                    .unwrap_or(Slot::Blue),
            };
            let group = ledger.group_mut(slot);
            let leftovers = group.endpoint_ids();
            group.role = Role::Staging;
            group.artifact = Some(artifact.clone());
            group.endpoints.clear();
            group.generation += 1;
            (group.handle(), leftovers)
        };

        if !leftovers.is_empty() {
            tracing::warn!(
                service = %self.settings.service,
                group = %handle.id,
                count = leftovers.len(),
                "terminating leftover endpoints before launch"
            );
            if let Err(e) = self
                .compute
                .terminate_endpoints(&leftovers, Duration::ZERO)
                .await
            {
                self.release_slot(&handle);
                return Err(PoolError::ProvisionError {
                    group: handle.id,
                    reason: format!("could not clear leftover endpoints: {e}"),
                });
            }
        }

        let spec = LaunchSpec {
            service: self.settings.service.clone(),
            group: handle.id.clone(),
            artifact: artifact.clone(),
            count: self.settings.desired_count,
            port: self.settings.port,
            protocol: self.settings.protocol,
            health_check: self.settings.health_check.clone(),
            tags: self.settings.tags.clone(),
        };

        let launched = match self.compute.launch_endpoints(&spec).await {
            Ok(endpoints) if !endpoints.is_empty() => endpoints,
            Ok(_) => {
                self.release_slot(&handle);
                return Err(PoolError::ProvisionError {
                    group: handle.id,
                    reason: "provider launched no endpoints".to_string(),
                });
            }
            Err(e) => {
                self.release_slot(&handle);
                return Err(PoolError::ProvisionError {
                    group: handle.id,
                    reason: e.to_string(),
                });
            }
        };

        {
            let mut ledger = self.ledger.write();
            let group = ledger.group_mut(handle.slot);
            ensure_current(group, &handle)?;
            group.endpoints = launched.into_iter().map(RegisteredEndpoint::new).collect();
        }

        tracing::info!(
            service = %self.settings.service,
            group = %handle.id,
            slot = %handle.slot,
            artifact = %artifact,
            count = self.settings.desired_count,
            "candidate registered"
        );
        Ok(handle)
    }

    /// Nothing was launched: hand the slot back.
    fn release_slot(&self, handle: &TargetGroupHandle) {
        let mut ledger = self.ledger.write();
        let group = ledger.group_mut(handle.slot);
        if group.generation == handle.generation && group.role == Role::Staging {
            group.role = Role::Idle;
            group.artifact = None;
        }
    }

    /// Poll the group at the policy interval until every endpoint has a
    /// healthy streak, a terminal signal arrives, the deadline passes, or
    /// the interrupt fires.
    pub async fn wait_until_healthy(
        &self,
        handle: &TargetGroupHandle,
        timeout: Duration,
        interrupt: &mut Interrupt,
    ) -> Result<HealthReport, PoolError> {
        let deadline = Instant::now() + timeout;
        let interval = self.settings.health_check.interval;

        loop {
            let report = tokio::select! {
                report = self.sweep(handle) => report?,
                reason = interrupt.fired() => return Err(PoolError::Interrupted(reason)),
                _ = tokio::time::sleep_until(deadline) => return Err(self.timed_out(handle, timeout)),
            };

            if let Some((endpoint, reason)) = report.terminal() {
                return Err(PoolError::HealthCheckFailed {
                    group: handle.id.clone(),
                    endpoint: endpoint.clone(),
                    reason: reason.to_string(),
                });
            }

            if report.is_healthy() {
                tracing::info!(
                    service = %self.settings.service,
                    group = %handle.id,
                    endpoints = report.endpoints.len(),
                    "target group healthy"
                );
                return Ok(report);
            }

            tracing::debug!(
                group = %handle.id,
                healthy = report.healthy_count(),
                total = report.endpoints.len(),
                "waiting for target group health"
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                reason = interrupt.fired() => return Err(PoolError::Interrupted(reason)),
                _ = tokio::time::sleep_until(deadline) => return Err(self.timed_out(handle, timeout)),
            }
        }
    }

    fn timed_out(&self, handle: &TargetGroupHandle, timeout: Duration) -> PoolError {
        let ledger = self.ledger.read();
        let group = ledger.group(handle.slot);
        let healthy = group
            .endpoints
            .iter()
            .filter(|e| e.health == super::EndpointHealth::Healthy)
            .count();
        PoolError::HealthCheckTimeout {
            group: handle.id.clone(),
            timeout,
            healthy,
            total: group.endpoints.len(),
        }
    }

    /// One health sweep over the group.
    pub async fn check_group(&self, handle: &TargetGroupHandle) -> Result<HealthReport, PoolError> {
        self.sweep(handle).await
    }

    async fn sweep(&self, handle: &TargetGroupHandle) -> Result<HealthReport, PoolError> {
        let endpoints = {
            let ledger = self.ledger.read();
            let group = ledger.group(handle.slot);
            ensure_current(group, handle)?;
            group.endpoint_ids()
        };

        let policy = &self.settings.health_check;
        let results = join_all(endpoints.iter().map(|endpoint| async move {
            match tokio::time::timeout(policy.timeout, self.compute.health_check(endpoint, policy))
                .await
            {
                Ok(status) => status,
                Err(_) => ProbeStatus::Failing(format!("no answer within {:?}", policy.timeout)),
            }
        }))
        .await;

        let mut ledger = self.ledger.write();
        let group = ledger.group_mut(handle.slot);
        ensure_current(group, handle)?;

        let mut reports = Vec::with_capacity(endpoints.len());
        for (id, probe) in endpoints.into_iter().zip(results) {
            if let Some(endpoint) = group.endpoints.iter_mut().find(|e| e.id == id) {
                let health = endpoint.record(&probe, policy);
                reports.push(EndpointReport {
                    endpoint: id,
                    health,
                    probe,
                });
            }
        }

        Ok(HealthReport {
            group: handle.id.clone(),
            slot: handle.slot,
            checked_at: Utc::now(),
            endpoints: reports,
        })
    }

    /// Staging → production; the old production group becomes retiring.
    /// Returns the handle of the group that was serving production.
    pub fn promote(
        &self,
        handle: &TargetGroupHandle,
    ) -> Result<Option<TargetGroupHandle>, PoolError> {
        let mut ledger = self.ledger.write();
        {
            let group = ledger.group(handle.slot);
            ensure_current(group, handle)?;
            if group.role != Role::Staging {
                return Err(PoolError::InvalidRole {
                    operation: "promote",
                    slot: handle.slot,
                    role: group.role,
                });
            }
        }

        let other = ledger.group_mut(handle.slot.other());
        let replaced = if other.role == Role::Production {
            other.role = Role::Retiring;
            Some(other.handle())
        } else {
            None
        };
        ledger.group_mut(handle.slot).role = Role::Production;
        ledger.last_promotion = Some(Promotion {
            promoted: handle.clone(),
            replaced: replaced.clone(),
        });

        tracing::info!(
            service = %self.settings.service,
            production = %handle.id,
            retiring = ?replaced.as_ref().map(|h| h.id.to_string()),
            "roles swapped"
        );
        Ok(replaced)
    }

    /// Undo the last `promote` of `handle`: the group it replaced serves
    /// production again and the candidate goes back to staging.
    pub fn demote(&self, handle: &TargetGroupHandle) -> Result<(), PoolError> {
        let mut ledger = self.ledger.write();
        {
            let group = ledger.group(handle.slot);
            ensure_current(group, handle)?;
            if group.role != Role::Production {
                return Err(PoolError::InvalidRole {
                    operation: "demote",
                    slot: handle.slot,
                    role: group.role,
                });
            }
        }

        let replaced = match ledger.last_promotion.take() {
            Some(promotion) if promotion.promoted == *handle => promotion.replaced,
            _ => None,
        };
        if let Some(previous) = &replaced {
            let group = ledger.group_mut(previous.slot);
            if group.generation == previous.generation && group.role == Role::Retiring {
                group.role = Role::Production;
            }
        }
        ledger.group_mut(handle.slot).role = Role::Staging;

        tracing::info!(
            service = %self.settings.service,
            demoted = %handle.id,
            production = ?replaced.as_ref().map(|h| h.id.to_string()),
            "roles restored"
        );
        Ok(())
    }

    /// Drain and terminate the group's endpoints, then mark the slot idle.
    pub async fn retire(
        &self,
        handle: &TargetGroupHandle,
        drain_timeout: Duration,
    ) -> Result<(), PoolError> {
        let endpoints = {
            let mut ledger = self.ledger.write();
            let group = ledger.group_mut(handle.slot);
            ensure_current(group, handle)?;
            if group.role == Role::Production {
                return Err(PoolError::InvalidRole {
                    operation: "retire",
                    slot: handle.slot,
                    role: group.role,
                });
            }
            group.role = Role::Retiring;
            for endpoint in &mut group.endpoints {
                endpoint.health = super::EndpointHealth::Draining;
            }
            group.endpoint_ids()
        };

        if !endpoints.is_empty() {
            self.compute
                .terminate_endpoints(&endpoints, drain_timeout)
                .await
                .map_err(|e| PoolError::RetireFailed {
                    group: handle.id.clone(),
                    reason: e.to_string(),
                })?;
        }

        {
            let mut ledger = self.ledger.write();
            let group = ledger.group_mut(handle.slot);
            if group.generation == handle.generation {
                group.role = Role::Idle;
                group.artifact = None;
                group.endpoints.clear();
            }
        }

        tracing::info!(
            service = %self.settings.service,
            group = %handle.id,
            endpoints = endpoints.len(),
            ?drain_timeout,
            "target group retired"
        );
        Ok(())
    }

    /// Realign roles with what the production rule actually points at.
    /// Used after an operator repaired a failed rollback by hand.
    pub fn reconcile(&self, production: &RuleTarget) -> RoleAssignment {
        let mut ledger = self.ledger.write();
        for slot in Slot::ALL {
            let group = ledger.group_mut(slot);
            group.role = if production.group() == Some(&group.id) {
                Role::Production
            } else if group.endpoints.is_empty() {
                Role::Idle
            } else {
                Role::Retiring
            };
        }
        ledger.last_promotion = None;
        let roles = ledger.roles();
        tracing::warn!(
            service = %self.settings.service,
            blue = %roles.blue,
            green = %roles.green,
            "roles reconciled with production rule"
        );
        roles
    }
}
