// ABOUTME: Routing layer contract consumed by the traffic router.
// ABOUTME: A listener rule forwards to one target group or serves the fixed 404 response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{RuleId, TargetGroupId};

/// Where a listener rule sends traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "group", rename_all = "snake_case")]
pub enum RuleTarget {
    Group(TargetGroupId),
    /// Fixed "404 Not Found" response; no group qualifies.
    NotFound,
}

impl RuleTarget {
    pub fn group(&self) -> Option<&TargetGroupId> {
        match self {
            RuleTarget::Group(id) => Some(id),
            RuleTarget::NotFound => None,
        }
    }

    /// Parse the wire form used by command providers: a group id or `not-found`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | "not-found" => RuleTarget::NotFound,
            id => RuleTarget::Group(TargetGroupId::new(id)),
        }
    }
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleTarget::Group(id) => write!(f, "{id}"),
            RuleTarget::NotFound => f.write_str("not-found"),
        }
    }
}

/// Listener rule operations against the provider.
#[async_trait]
pub trait RoutingOps: Send + Sync {
    /// Replace a rule's forward target in a single update.
    async fn set_rule_target(&self, rule: &RuleId, target: &RuleTarget) -> Result<(), RoutingError>;

    async fn get_rule_target(&self, rule: &RuleId) -> Result<RuleTarget, RoutingError>;
}

/// Errors from routing operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
    #[error("rule not found: {0}")]
    UnknownRule(String),

    #[error("rule update rejected: {0}")]
    Rejected(String),

    #[error("routing layer unavailable: {0}")]
    Unavailable(String),
}
