//! Waitable in-process counterpart to the `metrics`-crate gauges in
//! [`crate::metrics`]. The gauges are write-only as far as this process is
//! concerned (they exist for an external scrape), but the supervisor's
//! shutdown sequence needs to read "are there still events/objects in
//! flight" back out — this is the Rust analogue of the original source's
//! `eventCounter.Wait()`.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use tokio::sync::Notify;

use crate::metrics;

/// Tracks how many units of work (events, objects, ...) are currently in
/// flight for one subsystem, and lets a caller wait until that count drops
/// to zero. Every mutation is also mirrored into the `metrics` crate's
/// `<subsystem>_active`/`_added`/`_done` family so the two views never
/// drift apart.
pub struct ActiveCounter {
    subsystem: &'static str,
    value: AtomicI64,
    notify: Notify,
}

impl ActiveCounter {
    pub fn new(subsystem: &'static str) -> Arc<Self> {
        Arc::new(Self {
            subsystem,
            value: AtomicI64::new(0),
            notify: Notify::new(),
        })
    }

    /// Registers `n` new units of in-flight work.
    pub fn add(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.value.fetch_add(n as i64, Ordering::SeqCst);
        metrics::active_add(self.subsystem, n as i64);
        metrics::added(self.subsystem, n);
    }

    /// Marks `n` units of work as finished. Wakes every waiter if the
    /// count reaches zero.
    pub fn done(&self, n: u64) {
        if n == 0 {
            return;
        }
        let remaining = self.value.fetch_sub(n as i64, Ordering::SeqCst) - n as i64;
        metrics::active_sub(self.subsystem, n as i64);
        metrics::done(self.subsystem, n);
        if remaining <= 0 {
            self.notify.notify_waiters();
        }
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Resolves once the count is at or below zero. Registers for
    /// notification before re-checking the value, so a `done()` racing
    /// with this call can never be missed.
    pub async fn wait_for_zero(&self) {
        loop {
            let notified = self.notify.notified();
            if self.get() <= 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_immediately_when_already_zero() {
        let counter = ActiveCounter::new("test");
        tokio::time::timeout(Duration::from_millis(50), counter.wait_for_zero())
            .await
            .expect("should not time out");
    }

    #[tokio::test]
    async fn wait_resolves_once_done_catches_up_with_add() {
        let counter = ActiveCounter::new("test");
        counter.add(3);

        let waiter = tokio::spawn({
            let counter = Arc::clone(&counter);
            async move { counter.wait_for_zero().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        counter.done(2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        counter.done(1);

        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("should not time out")
            .expect("task should not panic");
    }
}
