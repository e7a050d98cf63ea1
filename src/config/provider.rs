// ABOUTME: Provider adapter commands for the compute and routing contracts.
// ABOUTME: Each operation maps to an executable, by default under .switchyard/provider/.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Directory holding the default provider scripts.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub launch: Option<PathBuf>,

    #[serde(default)]
    pub terminate: Option<PathBuf>,

    #[serde(default)]
    pub set_rule_target: Option<PathBuf>,

    #[serde(default)]
    pub get_rule_target: Option<PathBuf>,

    /// Optional endpoint status script, consulted before each health check.
    #[serde(default)]
    pub status: Option<PathBuf>,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_dir() -> PathBuf {
    PathBuf::from(".switchyard/provider")
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            launch: None,
            terminate: None,
            set_rule_target: None,
            get_rule_target: None,
            status: None,
            command_timeout: default_command_timeout(),
        }
    }
}

/// A provider operation backed by a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOp {
    Launch,
    Terminate,
    SetRuleTarget,
    GetRuleTarget,
    Status,
}

impl ProviderOp {
    pub fn filename(&self) -> &'static str {
        match self {
            ProviderOp::Launch => "launch",
            ProviderOp::Terminate => "terminate",
            ProviderOp::SetRuleTarget => "set-rule-target",
            ProviderOp::GetRuleTarget => "get-rule-target",
            ProviderOp::Status => "status",
        }
    }
}

impl ProviderConfig {
    /// Resolve the executable for `op`, relative paths against `project_dir`.
    pub fn command_path(&self, project_dir: &Path, op: ProviderOp) -> PathBuf {
        let explicit = match op {
            ProviderOp::Launch => &self.launch,
            ProviderOp::Terminate => &self.terminate,
            ProviderOp::SetRuleTarget => &self.set_rule_target,
            ProviderOp::GetRuleTarget => &self.get_rule_target,
            ProviderOp::Status => &self.status,
        };
        let path = explicit
            .clone()
            .unwrap_or_else(|| self.dir.join(op.filename()));
        if path.is_absolute() {
            path
        } else {
            project_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_commands_live_in_provider_dir() {
        let config = ProviderConfig::default();
        let path = config.command_path(Path::new("/srv/app"), ProviderOp::SetRuleTarget);
        assert_eq!(
            path,
            PathBuf::from("/srv/app/.switchyard/provider/set-rule-target")
        );
    }

    #[test]
    fn status_script_is_optional_and_lives_with_the_others() {
        let config = ProviderConfig::default();
        assert!(config.status.is_none());
        assert_eq!(
            config.command_path(Path::new("/srv/app"), ProviderOp::Status),
            PathBuf::from("/srv/app/.switchyard/provider/status")
        );
    }

    #[test]
    fn explicit_absolute_command_wins() {
        let config = ProviderConfig {
            launch: Some(PathBuf::from("/opt/bin/launch-tasks")),
            ..Default::default()
        };
        let path = config.command_path(Path::new("/srv/app"), ProviderOp::Launch);
        assert_eq!(path, PathBuf::from("/opt/bin/launch-tasks"));
    }
}
