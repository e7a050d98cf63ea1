// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates switchyard.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ArtifactRef, ServiceName};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    artifact: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(s) = service {
        config.service = ServiceName::new(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(a) = artifact {
        config.artifact =
            ArtifactRef::parse(a).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let [blue, green] = config.target_groups.ids(&config.service);
    let hc = &config.target_groups.health_check;
    format!(
        r#"service: {service}
artifact: {artifact}
desired_count: {desired}
container_port: {port}

target_groups:
  blue: {blue}
  green: {green}
  health_check:
    path: {hc_path}
    interval: 30s
    healthy_threshold: {healthy}
    unhealthy_threshold: {unhealthy}

listener:
  production:
    port: 80
  test:
    port: 8080
  # Test listener must only be reachable from verification callers
  allowed_cidr: 10.100.0.0/16

deployment:
  bake_time: 5m
  drain_timeout: 30s

verification:
  probes: 3
  window: 30s

pipeline:
  branch: main
  build_command: ./buildspec.sh
  deploy_timeout: 15m
"#,
        service = config.service,
        artifact = config.artifact,
        desired = config.desired_count,
        port = config.container_port,
        hc_path = hc.path,
        healthy = hc.healthy_threshold,
        unhealthy = hc.unhealthy_threshold,
    )
}
