// ABOUTME: Provider adapter error types with SNAFU context selectors.
// ABOUTME: Unifies spawn, timeout, and exit failures of provider commands.

use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

/// Failure running a provider command.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    #[snafu(display("provider command not found: {}", path.display()))]
    MissingCommand { path: PathBuf },

    #[snafu(display("failed to run {}: {source}", path.display()))]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{} timed out after {timeout:?}", path.display()))]
    Timeout { path: PathBuf, timeout: Duration },

    #[snafu(display("{} exited with status {code:?}: {stderr}", path.display()))]
    Failed {
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Command isn't installed; nothing was attempted.
    NotConfigured,
    /// Command ran (or tried to) and failed.
    CommandFailed,
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::MissingCommand { .. } => ProviderErrorKind::NotConfigured,
            ProviderError::Spawn { .. }
            | ProviderError::Timeout { .. }
            | ProviderError::Failed { .. } => ProviderErrorKind::CommandFailed,
        }
    }
}
