// ABOUTME: Target group health check policy.
// ABOUTME: HTTP path, expected status, polling interval, and streak thresholds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How endpoints of a target group are health checked.
///
/// Defaults mirror a load balancer's stock target group policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckPolicy {
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Consecutive passing checks before an endpoint counts as healthy.
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    /// Consecutive failing checks before an endpoint counts as unhealthy.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_expected_status() -> u16 {
    200
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_healthy_threshold() -> u32 {
    5
}

fn default_unhealthy_threshold() -> u32 {
    2
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            path: default_path(),
            port: default_port(),
            expected_status: default_expected_status(),
            interval: default_interval(),
            timeout: default_timeout(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}
