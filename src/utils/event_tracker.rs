use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use tokio::sync::Notify;

/// Wait-group style counter for in-flight events.
///
/// Producers increment before handing an event off, forward tasks
/// decrement in batches once their events are forwarded (or dropped due to
/// cancellation), and the drain barrier awaits zero. Decrements may race
/// with new increments; `wait` resolves at any zero crossing it observes.
#[derive(Debug, Default)]
pub struct EventTracker {
    count: AtomicI64,
    notify: Notify,
}

impl EventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `n` in-flight events.
    pub fn add(&self, n: i64) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    /// Releases `n` events. Batched negative delta, mirrors `add`.
    pub fn done(&self, n: i64) {
        let previous = self.count.fetch_sub(n, Ordering::AcqRel);
        if previous - n <= 0 {
            self.notify.notify_waiters();
        }
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    /// Resolves once the in-flight count reaches zero.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking, so a `done` racing with
            // the check still wakes us.
            let notified = self.notify.notified();
            if self.count.load(Ordering::Acquire) <= 0 {
                return;
            }
            notified.await;
        }
    }
}
