// ABOUTME: One-shot interrupt channel for suspended deployment states.
// ABOUTME: Health polling, verification, and bake monitoring select on it to stop promptly.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Why a running deployment was interrupted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum InterruptReason {
    /// Operator asked for a rollback.
    ManualRollback,
    /// An external fault signal arrived (alarm, health regression).
    Fault(String),
    /// The deployment was cancelled from outside.
    Cancelled,
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptReason::ManualRollback => f.write_str("manual rollback requested"),
            InterruptReason::Fault(detail) => write!(f, "fault signal: {detail}"),
            InterruptReason::Cancelled => f.write_str("deployment cancelled"),
        }
    }
}

/// Create a linked handle/receiver pair.
pub fn interrupt_channel() -> (InterruptHandle, Interrupt) {
    let (tx, rx) = watch::channel(None);
    (InterruptHandle { tx }, Interrupt { rx })
}

/// Sending side, held by whoever may interrupt the deployment.
#[derive(Debug)]
pub struct InterruptHandle {
    tx: watch::Sender<Option<InterruptReason>>,
}

impl InterruptHandle {
    /// Fire the interrupt. Only the first reason sticks; returns false if the
    /// interrupt had already fired or nobody is listening any more.
    pub fn fire(&self, reason: InterruptReason) -> bool {
        let mut fired = false;
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            fired = true;
            true
        });
        fired && !self.tx.is_closed()
    }

    pub fn is_fired(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Receiving side, owned by the deployment task.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<Option<InterruptReason>>,
}

impl Interrupt {
    /// An interrupt that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    /// The reason, if the interrupt has fired.
    pub fn reason(&self) -> Option<InterruptReason> {
        self.rx.borrow().clone()
    }

    /// Resolves once the interrupt fires. Pends forever if the handle is
    /// dropped without firing.
    pub async fn fired(&mut self) -> InterruptReason {
        loop {
            if let Some(reason) = self.rx.borrow_and_update().clone() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_reason_wins() {
        let (handle, mut interrupt) = interrupt_channel();
        assert!(handle.fire(InterruptReason::ManualRollback));
        assert!(!handle.fire(InterruptReason::Cancelled));
        assert_eq!(interrupt.fired().await, InterruptReason::ManualRollback);
        assert_eq!(interrupt.reason(), Some(InterruptReason::ManualRollback));
    }

    #[tokio::test]
    async fn dropped_handle_never_fires() {
        let (handle, mut interrupt) = interrupt_channel();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_millis(20), interrupt.fired()).await;
        assert!(waited.is_err());
    }
}
