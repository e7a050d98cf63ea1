// ABOUTME: Deployment timing and verification configuration.
// ABOUTME: Bake time, health and drain timeouts, rule retry budget, and probe window.

use serde::Deserialize;
use std::time::Duration;

use super::deserialize::deserialize_positive;

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Observation window after cutover before the previous group is retired.
    #[serde(default = "default_bake_time", with = "humantime_serde")]
    pub bake_time: Duration,

    /// Deadline for the candidate group to become healthy.
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,

    /// Grace period for in-flight requests when a group is retired.
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,

    #[serde(default = "default_rule_update_retries")]
    pub rule_update_retries: u32,

    #[serde(default = "default_rule_retry_backoff", with = "humantime_serde")]
    pub rule_retry_backoff: Duration,
}

fn default_bake_time() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_rule_update_retries() -> u32 {
    3
}

fn default_rule_retry_backoff() -> Duration {
    Duration::from_secs(1)
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            bake_time: default_bake_time(),
            health_timeout: default_health_timeout(),
            drain_timeout: default_drain_timeout(),
            rule_update_retries: default_rule_update_retries(),
            rule_retry_backoff: default_rule_retry_backoff(),
        }
    }
}

/// Probes sent through the test listener before cutover.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_probes", deserialize_with = "deserialize_positive")]
    pub probes: u32,

    /// All probes must pass within this window.
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    /// Overrides the test listener URL derived from the listener config.
    #[serde(default)]
    pub url: Option<String>,
}

fn default_probes() -> u32 {
    3
}

fn default_window() -> Duration {
    Duration::from_secs(30)
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_path() -> String {
    "/".to_string()
}

fn default_expected_status() -> u16 {
    200
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            probes: default_probes(),
            window: default_window(),
            interval: default_interval(),
            timeout: default_probe_timeout(),
            path: default_path(),
            expected_status: default_expected_status(),
            url: None,
        }
    }
}
