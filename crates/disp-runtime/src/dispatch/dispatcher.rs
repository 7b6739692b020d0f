use std::sync::Arc;
use std::time::Duration;

use disp_core::config::{DispatchOrder, DispatcherConfig};
use disp_core::error::{DispError, Result};
use disp_core::job::Job;
use disp_core::outcome::JobOutcome;
use disp_core::worker::WorkerId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::drain::{DrainResult, DrainTracker};
use super::pool::{Assignment, WorkerPool};
use super::queue::JobReceiver;
use super::worker::{PoolWorker, Worker};

/// How long shutdown waits for workers to exit after a drain timeout.
const JOIN_GRACE: Duration = Duration::from_secs(5);

/// Routes queued jobs to idle workers.
///
/// Created with a job queue and a worker count; nothing is processed until
/// [`Dispatcher::run`] starts the workers and the dispatch loop.
pub struct Dispatcher {
    jobs: JobReceiver,
    config: DispatcherConfig,
    pool: WorkerPool,
    returned_rx: mpsc::UnboundedReceiver<Assignment>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(jobs: JobReceiver, config: DispatcherConfig) -> Self {
        let (pool, returned_rx) = WorkerPool::new(config.max_workers);
        Self {
            jobs,
            config,
            pool,
            returned_rx,
        }
    }

    /// Publish every job outcome to `sink`.
    pub fn with_outcomes(mut self, sink: mpsc::UnboundedSender<JobOutcome>) -> Self {
        self.pool.set_outcomes(sink);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Start `max_workers` workers built by `factory`, then the dispatch loop.
    ///
    /// Fails fast on an invalid worker count or if any worker fails to
    /// start; workers started before the failure are stopped again.
    pub fn run<W, F>(self, mut factory: F) -> Result<DispatcherHandle>
    where
        W: Worker,
        F: FnMut(WorkerId, WorkerPool) -> W,
    {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            DispError::InvalidState(format!("dispatcher must run inside a tokio runtime: {}", e))
        })?;

        let max_workers = u32::try_from(self.config.max_workers)
            .map_err(|_| DispError::InvalidWorkerCount(self.config.max_workers))?;

        let mut workers: Vec<Box<dyn Worker>> = Vec::with_capacity(self.config.max_workers);
        let mut worker_tasks = Vec::with_capacity(self.config.max_workers);

        for id in (1..=max_workers).map(WorkerId::new) {
            let mut worker = factory(id, self.pool.clone());
            match worker.start() {
                Ok(task) => {
                    workers.push(Box::new(worker));
                    worker_tasks.push(task);
                }
                Err(e) => {
                    tracing::error!(worker_id = %id, error = %e, "Worker failed to start");
                    for started in &workers {
                        started.stop();
                    }
                    return Err(e);
                }
            }
        }

        let drain = Arc::new(DrainTracker::new());
        let intake = CancellationToken::new();
        let halt = CancellationToken::new();
        let (drained_tx, drained_rx) = oneshot::channel();

        let dispatch_loop = DispatchLoop {
            jobs: self.jobs,
            returned_rx: self.returned_rx,
            pool: self.pool.clone(),
            drain: drain.clone(),
            order: self.config.order,
            intake: intake.clone(),
            halt: halt.clone(),
            drained_tx: Some(drained_tx),
            next_seq: 0,
            closing: false,
        };
        let loop_task = runtime.spawn(dispatch_loop.run());

        tracing::info!(
            max_workers = self.config.max_workers,
            order = ?self.config.order,
            "Dispatcher started"
        );

        Ok(DispatcherHandle {
            workers,
            worker_tasks,
            loop_task,
            intake,
            halt,
            drained_rx,
            drain,
            pool: self.pool,
            config: self.config,
        })
    }

    /// Run with the default [`PoolWorker`].
    pub fn run_default(self) -> Result<DispatcherHandle> {
        self.run(PoolWorker::new)
    }
}

/// Lifecycle handle of a running dispatcher.
///
/// Dropping the handle leaves the workers and the dispatch loop running
/// for the lifetime of the runtime; call [`DispatcherHandle::shutdown`] to
/// stop them.
pub struct DispatcherHandle {
    workers: Vec<Box<dyn Worker>>,
    worker_tasks: Vec<JoinHandle<()>>,
    loop_task: JoinHandle<usize>,
    intake: CancellationToken,
    halt: CancellationToken,
    drained_rx: oneshot::Receiver<()>,
    drain: Arc<DrainTracker>,
    pool: WorkerPool,
    config: DispatcherConfig,
}

impl DispatcherHandle {
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id()).collect()
    }

    /// Ask one worker to stop. Returns false if no worker has that id.
    pub fn stop_worker(&self, worker_id: WorkerId) -> bool {
        match self.workers.iter().find(|w| w.id() == worker_id) {
            Some(worker) => {
                worker.stop();
                true
            }
            None => false,
        }
    }

    /// Jobs taken off the queue that have not finished executing.
    pub fn in_flight(&self) -> usize {
        self.drain.in_flight()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stop intake, finish queued and in-flight jobs, stop every worker and
    /// wait for them to exit.
    pub async fn shutdown(self) -> Result<ShutdownReport> {
        let deadline = Instant::now() + self.config.drain_timeout();
        tracing::info!("Starting graceful shutdown");

        self.intake.cancel();
        if tokio::time::timeout_at(deadline, self.drained_rx).await.is_err() {
            tracing::warn!("Job queue not exhausted before drain timeout");
        }

        let drain_result = self
            .drain
            .wait_for_drain(deadline, self.config.drain_poll_interval())
            .await;
        let unfinished = match drain_result {
            DrainResult::Completed => {
                tracing::info!("All in-flight jobs completed");
                0
            }
            DrainResult::Timeout(remaining) => {
                tracing::warn!(remaining, "Drain timeout reached with jobs still in flight");
                remaining
            }
        };

        for worker in &self.workers {
            worker.stop();
        }
        self.halt.cancel();

        let unassigned = match self.loop_task.await {
            Ok(unassigned) => unassigned,
            Err(e) if e.is_panic() => {
                return Err(DispError::Internal("dispatch loop panicked".to_string()));
            }
            Err(_) => 0,
        };
        let abandoned = unfinished + unassigned;

        let worker_ids: Vec<WorkerId> = self.workers.iter().map(|w| w.id()).collect();
        let mut workers_joined = 0;
        for (worker_id, mut task) in worker_ids.into_iter().zip(self.worker_tasks) {
            let joined = if unfinished == 0 {
                Ok((&mut task).await)
            } else {
                tokio::time::timeout(JOIN_GRACE, &mut task).await
            };

            match joined {
                Ok(Ok(())) => workers_joined += 1,
                Ok(Err(e)) => {
                    tracing::warn!(worker_id = %worker_id, error = %e, "Worker task failed");
                }
                Err(_) => {
                    tracing::warn!(worker_id = %worker_id, "Worker still busy after grace period, aborting");
                    task.abort();
                }
            }
        }

        tracing::info!(workers_joined, abandoned, "Dispatcher stopped");
        Ok(ShutdownReport {
            drained: abandoned == 0,
            abandoned,
            workers_joined,
        })
    }
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every submitted job finished before the drain timeout.
    pub drained: bool,
    /// Jobs still unfinished at the drain timeout, whether dequeued or
    /// still buffered in the queue.
    pub abandoned: usize,
    /// Worker tasks that exited cleanly.
    pub workers_joined: usize,
}

struct DispatchLoop {
    jobs: JobReceiver,
    returned_rx: mpsc::UnboundedReceiver<Assignment>,
    pool: WorkerPool,
    drain: Arc<DrainTracker>,
    order: DispatchOrder,
    intake: CancellationToken,
    halt: CancellationToken,
    drained_tx: Option<oneshot::Sender<()>>,
    next_seq: u64,
    closing: bool,
}

impl DispatchLoop {
    /// Returns the number of jobs left in the queue when halted.
    async fn run(mut self) -> usize {
        let mut claims = JoinSet::new();
        let mut queue_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.halt.cancelled() => break,
                _ = self.intake.cancelled(), if !self.closing => self.close_intake(),
                Some(assignment) = self.returned_rx.recv() => {
                    self.forward(assignment, &mut claims).await;
                }
                job = self.jobs.recv(), if queue_open => match job {
                    Some(job) => {
                        let assignment = self.assign(job);
                        self.forward(assignment, &mut claims).await;
                    }
                    None => {
                        queue_open = false;
                        if let Some(tx) = self.drained_tx.take() {
                            let _ = tx.send(());
                        }
                        tracing::debug!("Job queue exhausted");
                    }
                },
                Some(joined) = claims.join_next(), if !claims.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Claim task panicked");
                        }
                    }
                }
            }
        }

        if !claims.is_empty() {
            tracing::warn!(pending = claims.len(), "Aborting jobs still waiting for a worker");
        }
        claims.abort_all();

        self.jobs.close();
        let mut unassigned = 0;
        while let Some(job) = self.jobs.try_recv() {
            tracing::warn!(job_id = %job.id(), job = %job.name(), "Job never dequeued before halt");
            unassigned += 1;
        }

        tracing::debug!("Dispatch loop stopped");
        unassigned
    }

    fn close_intake(&mut self) {
        self.closing = true;
        self.jobs.close();
        tracing::info!("Job intake closed");
    }

    fn assign(&mut self, job: Job) -> Assignment {
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!(job_id = %job.id(), job = %job.name(), seq, "Job dequeued");
        Assignment::new(job, seq, self.drain.acquire())
    }

    async fn forward(&mut self, assignment: Assignment, claims: &mut JoinSet<()>) {
        let pool = self.pool.clone();
        match self.order {
            DispatchOrder::Concurrent => {
                claims.spawn(async move { pool.hand_off(assignment).await });
            }
            DispatchOrder::Fifo => {
                let hand_off = pool.hand_off(assignment);
                tokio::pin!(hand_off);

                // Intake must close even while waiting for a free worker.
                loop {
                    tokio::select! {
                        biased;
                        _ = self.halt.cancelled() => return,
                        _ = self.intake.cancelled(), if !self.closing => self.close_intake(),
                        _ = &mut hand_off => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::queue;

    #[test]
    fn test_run_outside_runtime() {
        let (_tx, rx) = queue::unbounded();
        let dispatcher = Dispatcher::new(rx, DispatcherConfig::with_workers(2));

        assert!(matches!(
            dispatcher.run_default(),
            Err(DispError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let (_tx, rx) = queue::unbounded();
        let dispatcher = Dispatcher::new(rx, DispatcherConfig::with_workers(0));

        assert!(matches!(
            dispatcher.run_default(),
            Err(DispError::InvalidWorkerCount(0))
        ));
    }

    #[tokio::test]
    async fn test_pool_capacity_matches_worker_count() {
        let (_tx, rx) = queue::unbounded();
        let dispatcher = Dispatcher::new(rx, DispatcherConfig::with_workers(3));
        assert_eq!(dispatcher.pool().capacity(), 3);
    }

    #[tokio::test]
    async fn test_worker_ids_are_one_based() {
        let (_tx, rx) = queue::unbounded();
        let handle = Dispatcher::new(rx, DispatcherConfig::with_workers(3))
            .run_default()
            .unwrap();

        assert_eq!(
            handle.worker_ids(),
            vec![WorkerId::new(1), WorkerId::new(2), WorkerId::new(3)]
        );
        assert!(handle.stop_worker(WorkerId::new(2)));
        assert!(!handle.stop_worker(WorkerId::new(4)));

        let report = handle.shutdown().await.unwrap();
        assert!(report.drained);
        assert_eq!(report.workers_joined, 3);
    }

    #[tokio::test]
    async fn test_shutdown_from_spawned_task() {
        let (jobs, rx) = queue::unbounded();
        let handle = Dispatcher::new(rx, DispatcherConfig::with_workers(2))
            .run_default()
            .unwrap();
        jobs.submit(Job::delay("a", Duration::from_millis(1)))
            .await
            .unwrap();

        let report = tokio::spawn(handle.shutdown()).await.unwrap().unwrap();
        assert!(report.drained);
        assert_eq!(report.workers_joined, 2);
    }
}
