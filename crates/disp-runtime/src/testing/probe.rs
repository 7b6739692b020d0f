use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use disp_core::job::{Job, JobContext, Work};
use disp_core::worker::WorkerId;
use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;

/// Record of one probed execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub job_name: String,
    pub worker_id: WorkerId,
    pub seq: u64,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct ProbeState {
    active: AtomicUsize,
    max_active: AtomicUsize,
    completed: AtomicUsize,
    worker_overlap: AtomicBool,
    busy: Mutex<HashSet<WorkerId>>,
    executions: Mutex<Vec<Execution>>,
}

/// Shared recorder for probed jobs.
#[derive(Clone, Default)]
pub struct Probe {
    state: Arc<ProbeState>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A job that records its execution and then sleeps for `duration`.
    pub fn job(&self, name: impl Into<String>, duration: Duration) -> Job {
        Job::new(
            name,
            ProbeWork {
                probe: self.clone(),
                duration,
            },
        )
    }

    /// Jobs executing right now.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of jobs ever executing at once.
    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    /// Whether any worker ever started a job while executing another.
    pub fn worker_overlap(&self) -> bool {
        self.state.worker_overlap.load(Ordering::SeqCst)
    }

    /// Finished executions, in completion order.
    pub fn executions(&self) -> Vec<Execution> {
        self.state
            .executions
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Finished executions of the named job.
    pub fn executions_of(&self, name: &str) -> Vec<Execution> {
        self.executions()
            .into_iter()
            .filter(|e| e.job_name == name)
            .collect()
    }

    /// Wait until at least `n` probed jobs have completed.
    pub async fn wait_for_completed(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.completed() >= n).await
    }

    /// Wait until at least `n` probed jobs are executing at once.
    pub async fn wait_for_active(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.active() >= n).await
    }

    async fn wait_until(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !condition() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        true
    }

    fn enter(&self, worker_id: WorkerId) {
        if let Ok(mut busy) = self.state.busy.lock() {
            if !busy.insert(worker_id) {
                self.state.worker_overlap.store(true, Ordering::SeqCst);
            }
        }
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
    }

    fn exit(&self, execution: Execution) {
        if let Ok(mut busy) = self.state.busy.lock() {
            busy.remove(&execution.worker_id);
        }
        if let Ok(mut executions) = self.state.executions.lock() {
            executions.push(execution);
        }
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.state.completed.fetch_add(1, Ordering::SeqCst);
    }
}

struct ProbeWork {
    probe: Probe,
    duration: Duration,
}

impl Work for ProbeWork {
    fn execute(&self, ctx: JobContext) -> BoxFuture<'_, disp_core::Result<()>> {
        async move {
            let started = Instant::now();
            self.probe.enter(ctx.worker_id);
            tokio::time::sleep(self.duration).await;
            self.probe.exit(Execution {
                job_name: ctx.job_name,
                worker_id: ctx.worker_id,
                seq: ctx.seq,
                started,
                finished: Instant::now(),
            });
            Ok(())
        }
        .boxed()
    }
}
