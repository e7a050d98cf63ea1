// ABOUTME: Traffic router owning the production and test listener rules.
// ABOUTME: Each repoint is one rule update, confirmed by reading it back, retried with backoff.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::substrate::{RoutingError, RoutingOps, RuleTarget};
use crate::types::RuleId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    #[error("rule {rule} not pointed at {target} after {attempts} attempts: {last_error}")]
    RuleUpdateFailed {
        rule: RuleId,
        target: RuleTarget,
        attempts: u32,
        last_error: RoutingError,
    },

    #[error("failed to read rule {rule}: {source}")]
    ReadFailed { rule: RuleId, source: RoutingError },
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub production_rule: RuleId,
    pub test_rule: RuleId,
    /// Retries after the first attempt.
    pub retries: u32,
    pub backoff: Duration,
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            production_rule: config.listener.production_rule(&config.service),
            test_rule: config.listener.test_rule(&config.service),
            retries: config.deployment.rule_update_retries,
            backoff: config.deployment.rule_retry_backoff,
        }
    }
}

pub struct TrafficRouter<R> {
    routing: Arc<R>,
    settings: RouterSettings,
}

impl<R> std::fmt::Debug for TrafficRouter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficRouter")
            .field("settings", &self.settings)
            .finish()
    }
}

impl<R: RoutingOps> TrafficRouter<R> {
    pub fn new(routing: Arc<R>, settings: RouterSettings) -> Self {
        Self { routing, settings }
    }

    pub fn production_rule(&self) -> &RuleId {
        &self.settings.production_rule
    }

    pub fn test_rule(&self) -> &RuleId {
        &self.settings.test_rule
    }

    pub async fn point_production(&self, target: &RuleTarget) -> Result<(), RouterError> {
        self.update(&self.settings.production_rule, target).await
    }

    /// `RuleTarget::NotFound` leaves the test path serving the fixed 404.
    pub async fn point_test(&self, target: &RuleTarget) -> Result<(), RouterError> {
        self.update(&self.settings.test_rule, target).await
    }

    pub async fn current_production_target(&self) -> Result<RuleTarget, RouterError> {
        self.read(&self.settings.production_rule).await
    }

    pub async fn current_test_target(&self) -> Result<RuleTarget, RouterError> {
        self.read(&self.settings.test_rule).await
    }

    async fn read(&self, rule: &RuleId) -> Result<RuleTarget, RouterError> {
        self.routing
            .get_rule_target(rule)
            .await
            .map_err(|source| RouterError::ReadFailed {
                rule: rule.clone(),
                source,
            })
    }

    async fn update(&self, rule: &RuleId, target: &RuleTarget) -> Result<(), RouterError> {
        let attempts = self.settings.retries.saturating_add(1);
        let mut backoff = self.settings.backoff;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.try_update(rule, target).await {
                Ok(()) => {
                    tracing::info!(%rule, %target, attempt, "rule updated");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(%rule, %target, attempt, error = %e, "rule update failed");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        Err(RouterError::RuleUpdateFailed {
            rule: rule.clone(),
            target: target.clone(),
            attempts,
            last_error: last_error
                .unwrap_or_else(|| RoutingError::Unavailable("no attempt made".to_string())),
        })
    }

    async fn try_update(&self, rule: &RuleId, target: &RuleTarget) -> Result<(), RoutingError> {
        self.routing.set_rule_target(rule, target).await?;
        let actual = self.routing.get_rule_target(rule).await?;
        if actual != *target {
            return Err(RoutingError::Rejected(format!(
                "rule reads back {actual}, expected {target}"
            )));
        }
        Ok(())
    }
}
