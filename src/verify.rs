// ABOUTME: Verification probes sent through the test listener before cutover.
// ABOUTME: All probes must pass inside the window; the first failure ends verification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::interrupt::{Interrupt, InterruptReason};
use crate::substrate::http;

/// Result of one verification probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub attempt: u32,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn passed(attempt: u32, status: Option<u16>) -> Self {
        Self {
            attempt,
            passed: true,
            status,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn failed(attempt: u32, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            attempt,
            passed: false,
            status,
            detail: Some(detail.into()),
            at: Utc::now(),
        }
    }
}

/// Something that can send one probe through the verification path.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn probe(&self, attempt: u32) -> ProbeOutcome;
}

/// Probes the test listener over HTTP.
#[derive(Debug, Clone)]
pub struct HttpVerifier {
    url: String,
    expected_status: u16,
    timeout: Duration,
}

impl HttpVerifier {
    pub fn new(url: impl Into<String>, expected_status: u16, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            expected_status,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.verification_url(),
            config.verification.expected_status,
            config.verification.timeout,
        )
    }
}

#[async_trait]
impl Verifier for HttpVerifier {
    async fn probe(&self, attempt: u32) -> ProbeOutcome {
        match http::get_status(&self.url, self.timeout).await {
            Ok(status) if status == self.expected_status => {
                ProbeOutcome::passed(attempt, Some(status))
            }
            Ok(status) => ProbeOutcome::failed(
                attempt,
                Some(status),
                format!("expected {}, got {status}", self.expected_status),
            ),
            Err(e) => ProbeOutcome::failed(attempt, None, e.to_string()),
        }
    }
}

/// Verifier answering from a fixed script, then a default. Used in tests
/// and dry runs.
#[derive(Debug)]
pub struct ScriptedVerifier {
    answers: Mutex<VecDeque<bool>>,
    otherwise: bool,
    delay: Duration,
}

impl ScriptedVerifier {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            otherwise: true,
            delay: Duration::ZERO,
        }
    }

    pub fn always(pass: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            otherwise: pass,
            delay: Duration::ZERO,
        }
    }

    /// Each probe takes `delay` to answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn probe(&self, attempt: u32) -> ProbeOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let pass = self.answers.lock().pop_front().unwrap_or(self.otherwise);
        if pass {
            ProbeOutcome::passed(attempt, Some(200))
        } else {
            ProbeOutcome::failed(attempt, Some(503), "scripted failure")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPlan {
    pub probes: u32,
    pub window: Duration,
    pub interval: Duration,
}

impl VerificationPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            probes: config.verification.probes,
            window: config.verification.window,
            interval: config.verification.interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("probe {attempt} failed: {detail}")]
    ProbeFailed { attempt: u32, detail: String },

    #[error("window of {window:?} expired after {passed} of {probes} probes passed")]
    WindowExpired {
        window: Duration,
        passed: u32,
        probes: u32,
    },

    #[error("interrupted: {0}")]
    Interrupted(InterruptReason),
}

/// Outcomes of a verification run and why it failed, if it did.
#[derive(Debug, Clone)]
pub struct Verification {
    pub outcomes: Vec<ProbeOutcome>,
    pub failure: Option<VerificationFailure>,
}

impl Verification {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Send `plan.probes` probes spaced by `plan.interval`. Passes only if every
/// probe passes before the window closes.
pub async fn run_verification<V: Verifier + ?Sized>(
    verifier: &V,
    plan: &VerificationPlan,
    interrupt: &mut Interrupt,
) -> Verification {
    let deadline = Instant::now() + plan.window;
    let mut outcomes = Vec::with_capacity(plan.probes as usize);

    let expired = |outcomes: &Vec<ProbeOutcome>| VerificationFailure::WindowExpired {
        window: plan.window,
        passed: outcomes.len() as u32,
        probes: plan.probes,
    };

    for attempt in 1..=plan.probes {
        if attempt > 1 {
            tokio::select! {
                _ = tokio::time::sleep(plan.interval) => {}
                reason = interrupt.fired() => {
                    return Verification { failure: Some(VerificationFailure::Interrupted(reason)), outcomes };
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let failure = expired(&outcomes);
                    return Verification { outcomes, failure: Some(failure) };
                }
            }
        }

        let outcome = tokio::select! {
            outcome = verifier.probe(attempt) => outcome,
            reason = interrupt.fired() => {
                return Verification { failure: Some(VerificationFailure::Interrupted(reason)), outcomes };
            }
            _ = tokio::time::sleep_until(deadline) => {
                let failure = expired(&outcomes);
                return Verification { outcomes, failure: Some(failure) };
            }
        };

        tracing::info!(
            attempt,
            passed = outcome.passed,
            status = ?outcome.status,
            "verification probe"
        );

        let failed = (!outcome.passed).then(|| VerificationFailure::ProbeFailed {
            attempt,
            detail: outcome.detail.clone().unwrap_or_default(),
        });
        outcomes.push(outcome);
        if let Some(failure) = failed {
            return Verification {
                outcomes,
                failure: Some(failure),
            };
        }
    }

    Verification {
        outcomes,
        failure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> VerificationPlan {
        VerificationPlan {
            probes: 3,
            window: Duration::from_secs(30),
            interval: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_passing_probes_pass() {
        let verifier = ScriptedVerifier::always(true);
        let result = run_verification(&verifier, &plan(), &mut Interrupt::never()).await;
        assert!(result.passed());
        assert_eq!(result.outcomes.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_stops_probing() {
        let verifier = ScriptedVerifier::new([true, false, true]);
        let result = run_verification(&verifier, &plan(), &mut Interrupt::never()).await;
        assert_eq!(result.outcomes.len(), 2);
        assert!(matches!(
            result.failure,
            Some(VerificationFailure::ProbeFailed { attempt: 2, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probes_expire_the_window() {
        let verifier = ScriptedVerifier::always(true).with_delay(Duration::from_secs(14));
        let result = run_verification(&verifier, &plan(), &mut Interrupt::never()).await;
        assert!(matches!(
            result.failure,
            Some(VerificationFailure::WindowExpired { passed: 1, .. })
        ));
    }
}
