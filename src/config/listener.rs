// ABOUTME: Load balancer listener configuration.
// ABOUTME: Production and test rules, their ports, path patterns, and the fixed fallback.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::deserialize::deserialize_path_patterns;
use crate::types::{RuleId, ServiceName};

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Host the listeners are reachable on (load balancer DNS name).
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "RuleConfig::production")]
    pub production: RuleConfig,

    #[serde(default = "RuleConfig::test")]
    pub test: RuleConfig,

    #[serde(
        default = "default_path_patterns",
        deserialize_with = "deserialize_path_patterns"
    )]
    pub path_patterns: NonEmpty<String>,

    /// Only callers from this range may reach the test listener. The network
    /// layer enforces it; switchyard only passes it to the provider.
    #[serde(default = "default_allowed_cidr")]
    pub allowed_cidr: String,

    /// Body of the fixed 404 response served when a rule has no target.
    #[serde(default = "default_not_found_body")]
    pub not_found_body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub port: u16,

    #[serde(default)]
    pub rule: Option<RuleId>,
}

impl RuleConfig {
    fn production() -> Self {
        Self {
            port: 80,
            rule: None,
        }
    }

    fn test() -> Self {
        Self {
            port: 8080,
            rule: None,
        }
    }
}

impl ListenerConfig {
    pub fn production_rule(&self, service: &ServiceName) -> RuleId {
        self.production
            .rule
            .clone()
            .unwrap_or_else(|| RuleId::new(format!("{service}-production-rule")))
    }

    pub fn test_rule(&self, service: &ServiceName) -> RuleId {
        self.test
            .rule
            .clone()
            .unwrap_or_else(|| RuleId::new(format!("{service}-test-rule")))
    }

    /// Base URL of the test listener, used by verification probes.
    pub fn test_url(&self) -> String {
        format!("http://{}:{}", self.host, self.test.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            production: RuleConfig::production(),
            test: RuleConfig::test(),
            path_patterns: default_path_patterns(),
            allowed_cidr: default_allowed_cidr(),
            not_found_body: default_not_found_body(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_path_patterns() -> NonEmpty<String> {
    NonEmpty::new("*".to_string())
}

fn default_allowed_cidr() -> String {
    "10.100.0.0/16".to_string()
}

fn default_not_found_body() -> String {
    "Not Found".to_string()
}
