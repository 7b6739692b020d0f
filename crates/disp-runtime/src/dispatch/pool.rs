use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::Utc;
use disp_core::error::{DispError, Result};
use disp_core::job::{Job, JobContext};
use disp_core::outcome::{JobOutcome, OutcomeStatus};
use disp_core::worker::WorkerId;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

use super::drain::InFlightGuard;

/// A job on its way to, or held by, exactly one worker.
///
/// Carries the job's dispatch sequence number and keeps the job counted as
/// in flight until the assignment is dropped.
#[derive(Debug)]
pub struct Assignment {
    job: Job,
    seq: u64,
    in_flight: InFlightGuard,
}

impl Assignment {
    pub(crate) fn new(job: Job, seq: u64, in_flight: InFlightGuard) -> Self {
        Self {
            job,
            seq,
            in_flight,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// A worker's private inbox, published into the pool to signal readiness.
#[derive(Debug, Clone)]
pub struct ReadyHandle {
    worker_id: WorkerId,
    inbox: mpsc::Sender<Assignment>,
}

impl ReadyHandle {
    pub fn new(worker_id: WorkerId, inbox: mpsc::Sender<Assignment>) -> Self {
        Self { worker_id, inbox }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Forward an assignment into the worker's inbox. Hands the assignment
    /// back if the worker has closed its inbox.
    async fn deliver(self, assignment: Assignment) -> std::result::Result<(), Assignment> {
        self.inbox.send(assignment).await.map_err(|e| e.0)
    }
}

/// Shared pool through which idle workers advertise readiness.
///
/// The registration channel has a fixed capacity equal to the dispatcher's
/// worker count. A worker id is present in the pool at most once at a time.
#[derive(Clone)]
pub struct WorkerPool {
    capacity: usize,
    ready_tx: mpsc::Sender<ReadyHandle>,
    ready_rx: Arc<Mutex<mpsc::Receiver<ReadyHandle>>>,
    registered: Arc<StdMutex<HashSet<WorkerId>>>,
    returned_tx: mpsc::UnboundedSender<Assignment>,
    outcomes: Option<mpsc::UnboundedSender<JobOutcome>>,
}

impl WorkerPool {
    /// Create a pool and the receiver for assignments bounced back by
    /// stopped workers.
    pub(crate) fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<Assignment>) {
        let capacity = capacity.max(1);
        let (ready_tx, ready_rx) = mpsc::channel(capacity);
        let (returned_tx, returned_rx) = mpsc::unbounded_channel();

        let pool = Self {
            capacity,
            ready_tx,
            ready_rx: Arc::new(Mutex::new(ready_rx)),
            registered: Arc::new(StdMutex::new(HashSet::new())),
            returned_tx,
            outcomes: None,
        };
        (pool, returned_rx)
    }

    pub(crate) fn set_outcomes(&mut self, sink: mpsc::UnboundedSender<JobOutcome>) {
        self.outcomes = Some(sink);
    }

    /// Maximum number of outstanding registrations.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of workers currently registered as ready.
    pub fn ready_count(&self) -> usize {
        self.registered().len()
    }

    /// Check whether a worker is currently registered.
    pub fn is_registered(&self, worker_id: WorkerId) -> bool {
        self.registered().contains(&worker_id)
    }

    /// Publish a worker's readiness, waiting while the pool is full.
    ///
    /// If this future is dropped before it completes the handle was not
    /// published, but the id stays reserved until [`WorkerPool::withdraw`].
    pub async fn register(&self, handle: ReadyHandle) -> Result<()> {
        let worker_id = handle.worker_id;
        if !self.registered().insert(worker_id) {
            return Err(DispError::AlreadyRegistered(worker_id));
        }

        // The pool owns both ends of the channel, so the send can only wait.
        let _ = self.ready_tx.send(handle).await;

        tracing::trace!(worker_id = %worker_id, "Worker registered as ready");
        Ok(())
    }

    /// Drop a worker's registration. Any handle it left in the channel is
    /// discarded when claimed, because its inbox is closed.
    pub fn withdraw(&self, worker_id: WorkerId) -> bool {
        self.registered().remove(&worker_id)
    }

    /// Take the next ready worker, waiting until one registers.
    ///
    /// Pends forever if no worker ever registers again; the channel itself
    /// never closes because the pool holds a sender.
    pub(crate) async fn claim(&self) -> ReadyHandle {
        let Some(handle) = self.ready_rx.lock().await.recv().await else {
            return std::future::pending().await;
        };
        self.registered().remove(&handle.worker_id);
        handle
    }

    /// Claim a worker and forward the assignment into its inbox, retrying
    /// with another worker if the claimed one has stopped.
    pub(crate) async fn hand_off(&self, mut assignment: Assignment) {
        loop {
            tracing::debug!(
                job = %assignment.job.name(),
                seq = assignment.seq,
                "Fetching worker for job"
            );

            let handle = self.claim().await;
            let worker_id = handle.worker_id;
            match handle.deliver(assignment).await {
                Ok(()) => {
                    tracing::debug!(worker_id = %worker_id, "Job added to worker inbox");
                    return;
                }
                Err(bounced) => {
                    tracing::debug!(
                        worker_id = %worker_id,
                        job = %bounced.job.name(),
                        "Claimed worker has stopped, claiming another"
                    );
                    assignment = bounced;
                }
            }
        }
    }

    /// Send an assignment a stopped worker never executed back to the
    /// dispatch loop.
    pub fn return_assignment(&self, assignment: Assignment) {
        tracing::warn!(
            job = %assignment.job.name(),
            seq = assignment.seq,
            "Returning undelivered job to dispatcher"
        );
        if let Err(e) = self.returned_tx.send(assignment) {
            tracing::error!(
                job = %e.0.job.name(),
                "Dispatcher is gone, job dropped"
            );
        }
    }

    /// Execute one assignment on behalf of a worker.
    ///
    /// Failures, panics and timeouts of the job's work are captured in the
    /// returned outcome and never propagate to the caller.
    pub async fn execute(&self, worker_id: WorkerId, assignment: Assignment) -> JobOutcome {
        let Assignment {
            job,
            seq,
            in_flight,
        } = assignment;

        let ctx = JobContext::new(job.id(), job.name(), worker_id, seq);
        let span = ctx.span();

        tracing::info!(
            worker_id = %worker_id,
            job_id = %job.id(),
            job = %job.name(),
            seq = seq,
            "Job started"
        );

        let started_at = Utc::now();
        let run = AssertUnwindSafe(job.work().execute(ctx).instrument(span)).catch_unwind();
        let status = match job.timeout() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => status_of(result),
                Err(_) => OutcomeStatus::TimedOut { after: limit },
            },
            None => status_of(run.await),
        };
        let finished_at = Utc::now();

        match &status {
            OutcomeStatus::Completed => {
                tracing::info!(worker_id = %worker_id, job = %job.name(), seq = seq, "Job completed");
            }
            OutcomeStatus::Failed { error } => {
                tracing::error!(worker_id = %worker_id, job = %job.name(), error = %error, "Job failed");
            }
            OutcomeStatus::Panicked { message } => {
                tracing::error!(worker_id = %worker_id, job = %job.name(), panic = %message, "Job panicked");
            }
            OutcomeStatus::TimedOut { after } => {
                tracing::warn!(worker_id = %worker_id, job = %job.name(), after = ?after, "Job timed out");
            }
        }

        let outcome = JobOutcome {
            job_id: job.id(),
            job_name: job.name().to_string(),
            seq,
            worker_id,
            started_at,
            finished_at,
            status,
        };

        if let Some(sink) = &self.outcomes {
            if sink.send(outcome.clone()).is_err() {
                tracing::debug!(job = %job.name(), "Outcome sink closed, outcome not delivered");
            }
        }

        // Counted in flight until the outcome is published.
        drop(in_flight);
        outcome
    }

    fn registered(&self) -> MutexGuard<'_, HashSet<WorkerId>> {
        self.registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn status_of(result: std::thread::Result<Result<()>>) -> OutcomeStatus {
    match result {
        Ok(Ok(())) => OutcomeStatus::Completed,
        Ok(Err(e)) => OutcomeStatus::Failed {
            error: e.to_string(),
        },
        Err(panic) => OutcomeStatus::Panicked {
            message: panic_message(panic.as_ref()),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
