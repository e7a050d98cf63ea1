// ABOUTME: Provider adapters that shell out to project-supplied commands.
// ABOUTME: Compute and routing scripts, source fetch and build commands, HTTP health checks.

use async_trait::async_trait;
use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::build::{BuildError, BuildOps, BuiltArtifact};
use super::compute::{ComputeError, ComputeOps, LaunchSpec, ProbeStatus};
use super::error::{
    FailedSnafu, MissingCommandSnafu, ProviderError, SpawnSnafu, TimeoutSnafu,
};
use super::http;
use super::routing::{RoutingError, RoutingOps, RuleTarget};
use super::source::{SourceBundle, SourceError, SourceOps};
use crate::config::{Config, HealthCheckPolicy, ProviderOp};
use crate::types::{ArtifactRef, EndpointId, RuleId, TriggerEvent};

/// Exit status a launch script uses to report exhausted capacity (EX_TEMPFAIL).
pub const EXIT_INSUFFICIENT_CAPACITY: i32 = 75;

/// Exit status a status script uses to report an endpoint that is gone for
/// good (EX_UNAVAILABLE).
pub const EXIT_ENDPOINT_GONE: i32 = 69;

/// Lines of build output kept on the run record.
const BUILD_LOG_TAIL: usize = 20;

/// Captured output of a successful command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty trimmed stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Runs provider commands with a deadline and captured output.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run an executable script with `env`.
    pub async fn run_script(
        &self,
        path: &Path,
        env: &[(&str, String)],
    ) -> Result<CommandOutput, ProviderError> {
        self.run_script_within(path, env, self.timeout).await
    }

    pub async fn run_script_within(
        &self,
        path: &Path,
        env: &[(&str, String)],
        timeout: Duration,
    ) -> Result<CommandOutput, ProviderError> {
        ensure!(path.is_file(), MissingCommandSnafu { path });
        let mut cmd = Command::new(path);
        cmd.envs(env.iter().map(|(k, v)| (*k, v.as_str())));
        execute(cmd, path, timeout).await
    }

    /// Run a shell command line in `cwd`.
    pub async fn run_shell(
        &self,
        script: &str,
        cwd: &Path,
        env: &[(&str, String)],
    ) -> Result<CommandOutput, ProviderError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script)
            .current_dir(cwd)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())));
        execute(cmd, Path::new(script), self.timeout).await
    }
}

async fn execute(
    mut cmd: Command,
    path: &Path,
    timeout: Duration,
) -> Result<CommandOutput, ProviderError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(command = %path.display(), ?timeout, "running provider command");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.context(SpawnSnafu { path })?,
        Err(_) => return TimeoutSnafu { path, timeout }.fail(),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    ensure!(
        output.status.success(),
        FailedSnafu {
            path,
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        }
    );

    Ok(CommandOutput { stdout, stderr })
}

/// Compute contract backed by `launch` and `terminate` scripts.
///
/// `launch` receives the launch spec in `SWITCHYARD_*` variables and prints
/// one endpoint address (`host:port`) per line. `terminate` receives the
/// endpoints space-separated in `SWITCHYARD_ENDPOINTS`. An optional `status`
/// script gets `SWITCHYARD_ENDPOINT` before every health check and exits
/// with [`EXIT_ENDPOINT_GONE`] when the endpoint crashed or exited.
#[derive(Debug, Clone)]
pub struct CommandCompute {
    runner: CommandRunner,
    launch: PathBuf,
    terminate: PathBuf,
    status: PathBuf,
}

impl CommandCompute {
    pub fn from_config(config: &Config, project_dir: &Path) -> Self {
        Self {
            runner: CommandRunner::new(config.provider.command_timeout),
            launch: config.provider.command_path(project_dir, ProviderOp::Launch),
            terminate: config
                .provider
                .command_path(project_dir, ProviderOp::Terminate),
            status: config.provider.command_path(project_dir, ProviderOp::Status),
        }
    }

    /// Ask the status script about `endpoint`. None when there is no script
    /// or it reports the endpoint running.
    async fn endpoint_status(&self, endpoint: &EndpointId) -> Option<ProbeStatus> {
        if !self.status.is_file() {
            return None;
        }
        let env = [("SWITCHYARD_ENDPOINT", endpoint.to_string())];
        match self.runner.run_script(&self.status, &env).await {
            Ok(_) => None,
            Err(ProviderError::Failed {
                code: Some(EXIT_ENDPOINT_GONE),
                stderr,
                ..
            }) => Some(ProbeStatus::Terminal(if stderr.is_empty() {
                format!("{endpoint} is no longer running")
            } else {
                stderr
            })),
            Err(e) => Some(ProbeStatus::Failing(e.to_string())),
        }
    }
}

fn launch_env(spec: &LaunchSpec) -> Vec<(&'static str, String)> {
    let tags = spec
        .tags
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    vec![
        ("SWITCHYARD_SERVICE", spec.service.to_string()),
        ("SWITCHYARD_GROUP", spec.group.to_string()),
        ("SWITCHYARD_ARTIFACT", spec.artifact.to_string()),
        ("SWITCHYARD_COUNT", spec.count.to_string()),
        ("SWITCHYARD_PORT", spec.port.to_string()),
        ("SWITCHYARD_PROTOCOL", spec.protocol.to_string()),
        ("SWITCHYARD_HEALTH_PATH", spec.health_check.path.clone()),
        ("SWITCHYARD_TAGS", tags),
    ]
}

/// URL a health check for `endpoint` is sent to.
pub fn health_check_url(endpoint: &EndpointId, policy: &HealthCheckPolicy) -> String {
    let addr = endpoint.as_str();
    if addr.contains(':') {
        format!("http://{addr}{}", policy.path)
    } else {
        format!("http://{addr}:{}{}", policy.port, policy.path)
    }
}

#[async_trait]
impl ComputeOps for CommandCompute {
    async fn launch_endpoints(&self, spec: &LaunchSpec) -> Result<Vec<EndpointId>, ComputeError> {
        let output = self
            .runner
            .run_script(&self.launch, &launch_env(spec))
            .await
            .map_err(|e| match e {
                ProviderError::Failed {
                    code: Some(EXIT_INSUFFICIENT_CAPACITY),
                    stderr,
                    ..
                } => ComputeError::InsufficientCapacity(stderr),
                other => ComputeError::LaunchFailed(other.to_string()),
            })?;
        Ok(output.lines().map(EndpointId::new).collect())
    }

    async fn terminate_endpoints(
        &self,
        endpoints: &[EndpointId],
        drain_timeout: Duration,
    ) -> Result<(), ComputeError> {
        let list = endpoints
            .iter()
            .map(EndpointId::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let env = [
            ("SWITCHYARD_ENDPOINTS", list),
            (
                "SWITCHYARD_DRAIN_TIMEOUT",
                drain_timeout.as_secs().to_string(),
            ),
        ];
        self.runner
            .run_script_within(
                &self.terminate,
                &env,
                self.runner.timeout() + drain_timeout,
            )
            .await
            .map(|_| ())
            .map_err(|e| ComputeError::TerminateFailed(e.to_string()))
    }

    async fn health_check(&self, endpoint: &EndpointId, policy: &HealthCheckPolicy) -> ProbeStatus {
        if let Some(status) = self.endpoint_status(endpoint).await {
            return status;
        }
        let url = health_check_url(endpoint, policy);
        match http::get_status(&url, policy.timeout).await {
            Ok(status) if status == policy.expected_status => ProbeStatus::Passing,
            Ok(status) => ProbeStatus::Failing(format!(
                "expected status {}, got {status}",
                policy.expected_status
            )),
            Err(e) => ProbeStatus::Failing(e.to_string()),
        }
    }
}

/// Routing contract backed by `set-rule-target` and `get-rule-target` scripts.
///
/// Both receive `SWITCHYARD_RULE`; the setter also gets `SWITCHYARD_TARGET`
/// (a target group id or `not-found`), the getter prints the current target.
#[derive(Debug, Clone)]
pub struct CommandRouting {
    runner: CommandRunner,
    set: PathBuf,
    get: PathBuf,
    not_found_body: String,
}

impl CommandRouting {
    pub fn from_config(config: &Config, project_dir: &Path) -> Self {
        Self {
            runner: CommandRunner::new(config.provider.command_timeout),
            set: config
                .provider
                .command_path(project_dir, ProviderOp::SetRuleTarget),
            get: config
                .provider
                .command_path(project_dir, ProviderOp::GetRuleTarget),
            not_found_body: config.listener.not_found_body.clone(),
        }
    }
}

fn routing_error(e: ProviderError) -> RoutingError {
    match e {
        ProviderError::Failed { stderr, .. } => RoutingError::Rejected(stderr),
        other => RoutingError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl RoutingOps for CommandRouting {
    async fn set_rule_target(&self, rule: &RuleId, target: &RuleTarget) -> Result<(), RoutingError> {
        let env = [
            ("SWITCHYARD_RULE", rule.to_string()),
            ("SWITCHYARD_TARGET", target.to_string()),
            ("SWITCHYARD_NOT_FOUND_BODY", self.not_found_body.clone()),
        ];
        self.runner
            .run_script(&self.set, &env)
            .await
            .map(|_| ())
            .map_err(routing_error)
    }

    async fn get_rule_target(&self, rule: &RuleId) -> Result<RuleTarget, RoutingError> {
        let env = [("SWITCHYARD_RULE", rule.to_string())];
        let output = self
            .runner
            .run_script(&self.get, &env)
            .await
            .map_err(routing_error)?;
        Ok(RuleTarget::parse(output.lines().next().unwrap_or_default()))
    }
}

/// Source stage backed by an optional fetch command.
///
/// Without a command the project directory is the bundle. With one, it runs
/// in the project directory and must materialize the revision into
/// `$SWITCHYARD_BUNDLE_DIR`.
#[derive(Debug, Clone)]
pub struct CommandSource {
    runner: CommandRunner,
    project_dir: PathBuf,
    bundles_dir: PathBuf,
    command: Option<String>,
}

impl CommandSource {
    pub fn from_config(config: &Config, project_dir: &Path) -> Self {
        Self {
            runner: CommandRunner::new(config.provider.command_timeout),
            project_dir: project_dir.to_path_buf(),
            bundles_dir: config.state_dir(project_dir).join("bundles"),
            command: config.pipeline.source_command.clone(),
        }
    }
}

#[async_trait]
impl SourceOps for CommandSource {
    async fn fetch(&self, event: &TriggerEvent) -> Result<SourceBundle, SourceError> {
        let Some(command) = &self.command else {
            return Ok(SourceBundle {
                revision: event.revision.clone(),
                branch: event.branch.clone(),
                path: self.project_dir.clone(),
            });
        };

        let bundle_dir = self.bundles_dir.join(event.revision.as_str());
        tokio::fs::create_dir_all(&bundle_dir)
            .await
            .map_err(|e| SourceError::FetchFailed(e.to_string()))?;

        let env = [
            ("SWITCHYARD_REVISION", event.revision.to_string()),
            ("SWITCHYARD_BRANCH", event.branch.clone()),
            ("SWITCHYARD_BUNDLE_DIR", bundle_dir.display().to_string()),
        ];
        self.runner
            .run_shell(command, &self.project_dir, &env)
            .await
            .map_err(|e| SourceError::FetchFailed(e.to_string()))?;

        Ok(SourceBundle {
            revision: event.revision.clone(),
            branch: event.branch.clone(),
            path: bundle_dir,
        })
    }
}

/// Build stage backed by a buildspec-style shell command.
///
/// The command runs inside the bundle; the last non-empty stdout line must be
/// the built artifact reference, pinned by digest.
#[derive(Debug, Clone)]
pub struct CommandBuild {
    runner: CommandRunner,
    command: String,
}

impl CommandBuild {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runner: CommandRunner::new(config.pipeline.build_timeout),
            command: config.pipeline.build_command.clone(),
        }
    }
}

/// Parse the artifact a build printed as its last output line.
pub fn parse_build_output(stdout: &str) -> Result<ArtifactRef, BuildError> {
    let last = stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or(BuildError::MissingArtifact)?;
    ArtifactRef::parse(last).map_err(|e| BuildError::InvalidArtifact(format!("{last}: {e}")))
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl BuildOps for CommandBuild {
    async fn build(
        &self,
        bundle: &SourceBundle,
        repository: &str,
    ) -> Result<BuiltArtifact, BuildError> {
        let env = [
            ("SWITCHYARD_REVISION", bundle.revision.to_string()),
            ("SWITCHYARD_SHORT_REVISION", bundle.revision.short().to_string()),
            ("SWITCHYARD_IMAGE_REPOSITORY", repository.to_string()),
        ];
        let output = self
            .runner
            .run_shell(&self.command, &bundle.path, &env)
            .await
            .map_err(|e| match e {
                ProviderError::Failed { code, stderr, .. } => {
                    BuildError::NonZeroExit { code, stderr }
                }
                other => BuildError::Spawn(other.to_string()),
            })?;

        let artifact = parse_build_output(&output.stdout)?;
        let log = tail(
            &format!("{}{}", output.stdout, output.stderr),
            BUILD_LOG_TAIL,
        );
        Ok(BuiltArtifact { artifact, log })
    }
}
