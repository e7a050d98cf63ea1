// ABOUTME: Configuration types and parsing for switchyard.yml.
// ABOUTME: Handles YAML parsing, defaults, discovery, and cross-field validation.

mod deserialize;
mod healthcheck;
mod init;
mod listener;
mod pipeline;
mod provider;
mod rollout;

pub use healthcheck::HealthCheckPolicy;
pub use init::init_config;
pub use listener::{ListenerConfig, RuleConfig};
pub use pipeline::PipelineConfig;
pub use provider::{ProviderConfig, ProviderOp};
pub use rollout::{DeploymentConfig, VerificationConfig};

use crate::error::{Error, Result};
use crate::types::{ArtifactRef, ServiceName, TargetGroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use deserialize::deserialize_positive;

pub const CONFIG_FILENAME: &str = "switchyard.yml";
pub const CONFIG_FILENAME_ALT: &str = "switchyard.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".switchyard/config.yml";
pub const STATE_DIR_ENV: &str = "SWITCHYARD_STATE_DIR";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceName,

    /// Artifact the service runs before any release (initial blue group).
    #[serde(default = "default_artifact")]
    pub artifact: ArtifactRef,

    #[serde(default = "default_desired_count", deserialize_with = "deserialize_positive")]
    pub desired_count: u32,

    #[serde(default = "default_container_port")]
    pub container_port: u16,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub target_groups: TargetGroupsConfig,

    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Tags forwarded to the provider with every launch.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// The two target group slots. Colors only name the slots; which one serves
/// production changes with every deployment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetGroupsConfig {
    #[serde(default)]
    pub blue: Option<TargetGroupId>,

    #[serde(default)]
    pub green: Option<TargetGroupId>,

    #[serde(default)]
    pub health_check: HealthCheckPolicy,
}

impl TargetGroupsConfig {
    /// Provider ids of both slots, in slot order.
    pub fn ids(&self, service: &ServiceName) -> [TargetGroupId; 2] {
        [
            self.blue
                .clone()
                .unwrap_or_else(|| TargetGroupId::new(service.target_group_name("blue"))),
            self.green
                .clone()
                .unwrap_or_else(|| TargetGroupId::new(service.target_group_name("green"))),
        ]
    }
}

fn default_artifact() -> ArtifactRef {
    ArtifactRef::parse("public.ecr.aws/docker/library/httpd:2.4")
        .expect("default artifact reference is valid")
}

fn default_desired_count() -> u32 {
    1
}

fn default_container_port() -> u16 {
    80
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".switchyard/state")
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Checks that serde can't express on single fields.
    pub fn validate(&self) -> Result<()> {
        if self.listener.production.port == self.listener.test.port {
            return Err(Error::InvalidConfig(format!(
                "production and test listeners share port {}",
                self.listener.production.port
            )));
        }

        let [blue, green] = self.target_groups.ids(&self.service);
        if blue == green {
            return Err(Error::InvalidConfig(format!(
                "blue and green target groups must differ (both are {blue})"
            )));
        }

        if self.listener.production_rule(&self.service) == self.listener.test_rule(&self.service) {
            return Err(Error::InvalidConfig(
                "production and test listeners must use different rules".to_string(),
            ));
        }

        let hc = &self.target_groups.health_check;
        if hc.healthy_threshold == 0 || hc.unhealthy_threshold == 0 {
            return Err(Error::InvalidConfig(
                "health check thresholds must be at least 1".to_string(),
            ));
        }
        if hc.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "health check interval must be non-zero".to_string(),
            ));
        }

        if self.verification.window.is_zero() {
            return Err(Error::InvalidConfig(
                "verification window must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the state directory against the project directory.
    /// `SWITCHYARD_STATE_DIR` overrides the configured value.
    pub fn state_dir(&self, project_dir: &Path) -> PathBuf {
        let configured = std::env::var_os(STATE_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.state_dir.clone());
        if configured.is_absolute() {
            configured
        } else {
            project_dir.join(configured)
        }
    }

    /// URL verification probes are sent to.
    pub fn verification_url(&self) -> String {
        let base = self
            .verification
            .url
            .clone()
            .unwrap_or_else(|| self.listener.test_url());
        format!(
            "{}{}",
            base.trim_end_matches('/'),
            self.verification.path
        )
    }

    /// Repository that pipeline builds are pushed to.
    pub fn image_repository(&self) -> String {
        self.pipeline.image_repository.clone().unwrap_or_else(|| {
            match self.artifact.registry() {
                Some(registry) => format!("{}/{}", registry, self.artifact.repository()),
                None => self.artifact.repository().to_string(),
            }
        })
    }

    pub fn template() -> Self {
        Config {
            service: ServiceName::new("apache").expect("template service name is valid"),
            artifact: default_artifact(),
            desired_count: default_desired_count(),
            container_port: default_container_port(),
            protocol: Protocol::default(),
            target_groups: TargetGroupsConfig::default(),
            listener: ListenerConfig::default(),
            deployment: DeploymentConfig::default(),
            verification: VerificationConfig::default(),
            pipeline: PipelineConfig::default(),
            provider: ProviderConfig::default(),
            state_dir: default_state_dir(),
            tags: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_valid() {
        Config::template().validate().unwrap();
    }

    #[test]
    fn verification_url_defaults_to_test_listener() {
        let config = Config::template();
        assert_eq!(config.verification_url(), "http://localhost:8080/");
    }

    #[test]
    fn image_repository_follows_artifact() {
        let config = Config::template();
        assert_eq!(
            config.image_repository(),
            "public.ecr.aws/docker/library/httpd"
        );
    }
}
