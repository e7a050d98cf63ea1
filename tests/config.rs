// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML defaults, duration parsing, cross-field checks, and discovery.

use std::path::{Path, PathBuf};
use std::time::Duration;
use switchyard::config::*;
use switchyard::error::Error;
use switchyard::types::{RuleId, TargetGroupId};

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = Config::from_yaml("service: apache\n").unwrap();

        assert_eq!(config.service.as_str(), "apache");
        assert_eq!(config.desired_count, 1);
        assert_eq!(config.container_port, 80);
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(
            config.target_groups.ids(&config.service),
            [
                TargetGroupId::new("apache-blue-target-group"),
                TargetGroupId::new("apache-green-target-group"),
            ]
        );
        assert_eq!(
            config.listener.production_rule(&config.service),
            RuleId::new("apache-production-rule")
        );
        assert_eq!(config.listener.production.port, 80);
        assert_eq!(config.listener.test.port, 8080);
        assert_eq!(config.listener.path_patterns.first(), "*");
        assert_eq!(config.deployment.bake_time, Duration::from_secs(300));
        assert_eq!(config.verification.probes, 3);
        assert_eq!(config.pipeline.branch, "main");
        assert!(config.pipeline.trigger_on_push);
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
service: billing
artifact: registry.example.com/billing:v7
desired_count: 3
container_port: 8000
protocol: https

target_groups:
  blue: tg-billing-a
  green: tg-billing-b
  health_check:
    path: /healthz
    interval: 10s
    timeout: 2s
    healthy_threshold: 3
    unhealthy_threshold: 1

listener:
  host: lb.internal
  production:
    port: 443
    rule: rule-prod
  test:
    port: 9443
    rule: rule-test
  path_patterns: ["/api/*", "/health"]
  allowed_cidr: 10.0.0.0/8

deployment:
  bake_time: 15m
  health_timeout: 10m
  drain_timeout: 1m 30s
  rule_update_retries: 5
  rule_retry_backoff: 500ms

verification:
  probes: 5
  window: 1m
  interval: 10s
  path: /smoke

pipeline:
  branch: release
  trigger_on_push: false
  image_repository: registry.example.com/billing
  deploy_timeout: 30m

tags:
  team: payments
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.desired_count, 3);
        assert_eq!(config.protocol, Protocol::Https);
        assert_eq!(
            config.target_groups.ids(&config.service),
            [
                TargetGroupId::new("tg-billing-a"),
                TargetGroupId::new("tg-billing-b"),
            ]
        );
        let hc = &config.target_groups.health_check;
        assert_eq!(hc.path, "/healthz");
        assert_eq!(hc.interval, Duration::from_secs(10));
        assert_eq!(hc.timeout, Duration::from_secs(2));
        assert_eq!(hc.healthy_threshold, 3);
        assert_eq!(hc.unhealthy_threshold, 1);

        assert_eq!(
            config.listener.test_rule(&config.service),
            RuleId::new("rule-test")
        );
        assert_eq!(config.listener.path_patterns.len(), 2);

        assert_eq!(config.deployment.bake_time, Duration::from_secs(15 * 60));
        assert_eq!(config.deployment.drain_timeout, Duration::from_secs(90));
        assert_eq!(config.deployment.rule_update_retries, 5);
        assert_eq!(
            config.deployment.rule_retry_backoff,
            Duration::from_millis(500)
        );
        assert_eq!(config.verification.window, Duration::from_secs(60));
        assert_eq!(config.verification_url(), "http://lb.internal:9443/smoke");
        assert!(!config.pipeline.trigger_on_push);
        assert_eq!(config.image_repository(), "registry.example.com/billing");
        assert_eq!(config.tags.get("team").map(String::as_str), Some("payments"));
    }

    #[test]
    fn missing_service_returns_error() {
        let result = Config::from_yaml("desired_count: 2\n");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn invalid_service_name_returns_error() {
        assert!(Config::from_yaml("service: Bad_Name\n").is_err());
    }

    #[test]
    fn invalid_artifact_returns_error() {
        let yaml = "service: apache\nartifact: \"not an image\"\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn invalid_duration_returns_error() {
        let yaml = "service: apache\ndeployment:\n  bake_time: soon\n";
        assert!(matches!(Config::from_yaml(yaml), Err(Error::Yaml(_))));
    }
}

mod validation {
    use super::*;

    fn invalid(yaml: &str) -> String {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidConfig(msg)) => msg,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn listeners_must_use_different_ports() {
        let msg = invalid(
            r#"
service: apache
listener:
  production:
    port: 8080
  test:
    port: 8080
"#,
        );
        assert!(msg.contains("share port 8080"), "{msg}");
    }

    #[test]
    fn slots_must_use_different_groups() {
        let msg = invalid(
            r#"
service: apache
target_groups:
  blue: tg-same
  green: tg-same
"#,
        );
        assert!(msg.contains("must differ"), "{msg}");
    }

    #[test]
    fn listeners_must_use_different_rules() {
        let msg = invalid(
            r#"
service: apache
listener:
  production:
    port: 80
    rule: shared
  test:
    port: 8080
    rule: shared
"#,
        );
        assert!(msg.contains("different rules"), "{msg}");
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let msg = invalid(
            r#"
service: apache
target_groups:
  health_check:
    healthy_threshold: 0
"#,
        );
        assert!(msg.contains("thresholds"), "{msg}");
    }

    #[test]
    fn zero_window_is_rejected() {
        let msg = invalid("service: apache\nverification:\n  window: 0s\n");
        assert!(msg.contains("window"), "{msg}");
    }

    #[test]
    fn zero_desired_count_is_rejected() {
        let result = Config::from_yaml("service: apache\ndesired_count: 0\n");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn zero_probes_is_rejected() {
        let result = Config::from_yaml("service: apache\nverification:\n  probes: 0\n");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn empty_path_patterns_are_rejected() {
        let result = Config::from_yaml("service: apache\nlistener:\n  path_patterns: []\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("at least one path pattern"), "{err}");
    }

    #[test]
    fn blank_path_pattern_is_rejected() {
        let result = Config::from_yaml("service: apache\nlistener:\n  path_patterns: [\" \"]\n");
        assert!(result.is_err());
    }
}

mod discovery {
    use super::*;

    #[test]
    fn finds_primary_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "service: apache\n").unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "apache");
    }

    #[test]
    fn finds_file_under_dot_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".switchyard")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_DIR), "service: web\n").unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "web");
    }

    #[test]
    fn missing_config_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn init_then_discover() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("orders"), Some("registry.example.com/orders:v1"), false)
            .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "orders");
        assert_eq!(config.artifact.tag(), Some("v1"));
        assert!(matches!(
            init_config(dir.path(), None, None, false),
            Err(Error::AlreadyExists(_))
        ));
    }
}

mod state_dir {
    use super::*;

    fn config() -> Config {
        Config::from_yaml("service: apache\n").unwrap()
    }

    #[test]
    fn relative_default_joins_project_dir() {
        temp_env::with_var_unset(STATE_DIR_ENV, || {
            assert_eq!(
                config().state_dir(Path::new("/srv/app")),
                PathBuf::from("/srv/app/.switchyard/state")
            );
        });
    }

    #[test]
    fn absolute_configured_dir_is_kept() {
        temp_env::with_var_unset(STATE_DIR_ENV, || {
            let config = Config::from_yaml("service: apache\nstate_dir: /var/lib/switchyard\n")
                .unwrap();
            assert_eq!(
                config.state_dir(Path::new("/srv/app")),
                PathBuf::from("/var/lib/switchyard")
            );
        });
    }

    #[test]
    fn env_overrides_configured_dir() {
        temp_env::with_var(STATE_DIR_ENV, Some("/tmp/switchyard-state"), || {
            assert_eq!(
                config().state_dir(Path::new("/srv/app")),
                PathBuf::from("/tmp/switchyard-state")
            );
        });
    }

    #[test]
    fn empty_env_is_ignored() {
        temp_env::with_var(STATE_DIR_ENV, Some(""), || {
            assert_eq!(
                config().state_dir(Path::new("/srv/app")),
                PathBuf::from("/srv/app/.switchyard/state")
            );
        });
    }
}

mod derived {
    use super::*;

    #[test]
    fn verification_url_uses_override() {
        let config = Config::from_yaml(
            "service: apache\nverification:\n  url: http://10.100.2.17:8080/\n  path: /ping\n",
        )
        .unwrap();
        assert_eq!(config.verification_url(), "http://10.100.2.17:8080/ping");
    }

    #[test]
    fn image_repository_without_registry() {
        let config = Config::from_yaml("service: apache\nartifact: httpd:2.4\n").unwrap();
        assert_eq!(config.image_repository(), "httpd");
    }
}
