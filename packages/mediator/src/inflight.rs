//! In-flight operation counting for publisher drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts admitted, unsettled operations and wakes waiters at zero.
#[derive(Debug, Default)]
pub(crate) struct InflightCounter {
    count: AtomicUsize,
    notify: Notify,
}

impl InflightCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admit one operation. The count drops again when the guard does.
    pub(crate) fn begin(self: &Arc<Self>) -> InflightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InflightGuard {
            counter: self.clone(),
        }
    }

    /// Number of operations currently in flight.
    pub(crate) fn active(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until no operation is in flight.
    ///
    /// Notify is edge-triggered, so the count is rechecked after every wake.
    pub(crate) async fn wait_zero(&self) {
        loop {
            // Register before checking so a concurrent drop cannot be missed
            let notified = self.notify.notified();

            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }

            notified.await;
        }
    }
}

/// RAII guard for one in-flight operation.
///
/// Dropping it (normally, on panic, or when a task is aborted) settles the
/// operation.
#[derive(Debug)]
pub(crate) struct InflightGuard {
    counter: Arc<InflightCounter>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.counter.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.counter.notify.notify_waiters();
        }
    }
}
