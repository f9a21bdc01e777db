//! Tracking of detached counter writes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Counts in-flight writes and wakes waiters when none remain.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

/// Held by a write task for as long as the write is in flight.
pub(crate) struct WriteGuard(Arc<PendingWrites>);

impl PendingWrites {
    /// Register a write. The write counts as pending until the guard drops.
    pub fn start(self: &Arc<Self>) -> WriteGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        WriteGuard(Arc::clone(self))
    }

    /// Number of writes in flight.
    pub fn in_flight(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until no writes are in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent finish is not missed.
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
