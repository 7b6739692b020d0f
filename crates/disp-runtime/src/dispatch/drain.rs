use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks jobs that have left the queue but not yet finished executing.
#[derive(Debug, Default)]
pub struct DrainTracker {
    in_flight: AtomicUsize,
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current in-flight count.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Count one more job in flight until the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            tracker: self.clone(),
        }
    }

    /// Wait until nothing is in flight or the deadline passes.
    pub async fn wait_for_drain(&self, deadline: Instant, poll_interval: Duration) -> DrainResult {
        loop {
            let count = self.in_flight();

            if count == 0 {
                return DrainResult::Completed;
            }

            if Instant::now() >= deadline {
                return DrainResult::Timeout(count);
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Result of a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    /// All in-flight jobs finished.
    Completed,
    /// Deadline reached with jobs still in flight.
    Timeout(usize),
}

/// RAII guard for one in-flight job.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: Arc<DrainTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
