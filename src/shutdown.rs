//! Cooperative shutdown signaling shared by every long-running loop in the
//! pipeline (crawler inputs, worker pools, the supervisor's own waits).
//!
//! A single `tokio::sync::watch` channel plays the role of the source's
//! `done` channel: closing it (or sending through it) wakes every holder of
//! a [`ShutdownSignal`] currently selecting on [`ShutdownSignal::triggered`].

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<()>);

impl ShutdownSignal {
    /// True once shutdown has been triggered. Does not block.
    pub fn is_triggered(&self) -> bool {
        self.0.has_changed().unwrap_or(true)
    }

    /// Resolves once shutdown has been triggered. Safe to select against
    /// repeatedly from multiple tasks sharing a clone of the same signal.
    pub async fn triggered(&mut self) {
        // `changed` only resolves once per value; once the sender is
        // dropped it errors immediately, which we also treat as triggered.
        if self.is_triggered() {
            return;
        }
        let _ = self.0.changed().await;
    }
}

pub struct ShutdownHandle(watch::Sender<()>);

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(());
        (Self(tx), ShutdownSignal(rx))
    }

    /// Wakes every outstanding [`ShutdownSignal`]. Idempotent.
    pub fn trigger(&self) {
        let _ = self.0.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_resolves_immediately_once_triggered() {
        let (handle, mut signal) = ShutdownHandle::new();
        assert!(!signal.is_triggered());
        handle.trigger();
        signal.triggered().await;
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn clones_all_observe_the_trigger() {
        let (handle, signal) = ShutdownHandle::new();
        let mut a = signal.clone();
        let mut b = signal;
        handle.trigger();
        a.triggered().await;
        b.triggered().await;
    }
}
