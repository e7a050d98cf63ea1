// ABOUTME: Release pipeline configuration.
// ABOUTME: Watched branch, source fetch and build commands, image repository, stage timeouts.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Push events on `branch` start a run; other branches are ignored.
    #[serde(default = "default_true")]
    pub trigger_on_push: bool,

    /// Shell command that materializes the revision into `$SWITCHYARD_BUNDLE_DIR`.
    /// Without one, the project directory itself is the bundle.
    #[serde(default)]
    pub source_command: Option<String>,

    /// Shell command run inside the bundle; its last stdout line is the artifact.
    #[serde(default = "default_build_command")]
    pub build_command: String,

    /// Repository the built artifact is pushed to. Defaults to the configured
    /// artifact's repository.
    #[serde(default)]
    pub image_repository: Option<String>,

    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub build_timeout: Duration,

    /// How long the deploy stage waits for a terminal deployment state.
    #[serde(default = "default_deploy_timeout", with = "humantime_serde")]
    pub deploy_timeout: Duration,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

fn default_build_command() -> String {
    "./buildspec.sh".to_string()
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            trigger_on_push: default_true(),
            source_command: None,
            build_command: default_build_command(),
            image_repository: None,
            build_timeout: default_build_timeout(),
            deploy_timeout: default_deploy_timeout(),
        }
    }
}
