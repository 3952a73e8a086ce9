//! One-shot interrupt signals shared by master-side commands and agent-side
//! processes.

use tokio::sync::watch;

/// Fires an interrupt. Only the first reason is kept.
#[derive(Debug, Clone)]
pub struct InterruptTrigger(watch::Sender<Option<String>>);

/// Waits for an interrupt.
#[derive(Debug, Clone)]
pub struct InterruptHandle(watch::Receiver<Option<String>>);

/// A connected trigger/handle pair.
pub fn interrupt_pair() -> (InterruptTrigger, InterruptHandle) {
    let (tx, rx) = watch::channel(None);
    (InterruptTrigger(tx), InterruptHandle(rx))
}

impl InterruptTrigger {
    pub fn fire(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.0.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_fired(&self) -> bool {
        self.0.borrow().is_some()
    }
}

impl InterruptHandle {
    /// A handle that is never interrupted.
    pub fn never() -> Self {
        let (_, handle) = interrupt_pair();
        handle
    }

    /// The reason, if the interrupt has already fired.
    pub fn reason(&self) -> Option<String> {
        self.0.borrow().clone()
    }

    /// Resolves with the reason once the interrupt fires. Pends forever if
    /// the trigger is dropped without firing.
    pub async fn wait(&mut self) -> String {
        loop {
            if let Some(reason) = self.0.borrow_and_update().clone() {
                return reason;
            }
            if self.0.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}
