use disp_core::error::{DispError, Result};
use disp_core::worker::WorkerId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pool::{Assignment, ReadyHandle, WorkerPool};

/// An execution agent that processes one job at a time.
///
/// Workers are built by the factory passed to [`Dispatcher::run`], so the
/// implementation can be swapped without touching dispatch logic.
///
/// [`Dispatcher::run`]: super::Dispatcher::run
pub trait Worker: Send + 'static {
    /// Worker identity, unique within one dispatcher.
    fn id(&self) -> WorkerId;

    /// Launch the run loop on its own task.
    fn start(&mut self) -> Result<JoinHandle<()>>;

    /// Request termination without waiting for it.
    ///
    /// A job already executing runs to completion; the request takes effect
    /// the next time the worker is idle.
    fn stop(&self);
}

/// Default worker: registers its inbox with the pool, waits for a job or a
/// stop request, executes the job, and registers again.
pub struct PoolWorker {
    id: WorkerId,
    pool: WorkerPool,
    stop: CancellationToken,
    inbox_tx: mpsc::Sender<Assignment>,
    inbox: Option<mpsc::Receiver<Assignment>>,
}

impl PoolWorker {
    /// Create a new worker.
    pub fn new(id: WorkerId, pool: WorkerPool) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(1);
        Self {
            id,
            pool,
            stop: CancellationToken::new(),
            inbox_tx,
            inbox: Some(inbox),
        }
    }

    /// Check if a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl Worker for PoolWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn start(&mut self) -> Result<JoinHandle<()>> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| DispError::WorkerStart {
                worker_id: self.id,
                reason: e.to_string(),
            })?;

        let inbox = self
            .inbox
            .take()
            .ok_or_else(|| DispError::InvalidState(format!("worker {} already started", self.id)))?;

        let run_loop = RunLoop {
            id: self.id,
            pool: self.pool.clone(),
            stop: self.stop.clone(),
            handle: ReadyHandle::new(self.id, self.inbox_tx.clone()),
            inbox,
        };
        Ok(runtime.spawn(run_loop.run()))
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}

struct RunLoop {
    id: WorkerId,
    pool: WorkerPool,
    stop: CancellationToken,
    handle: ReadyHandle,
    inbox: mpsc::Receiver<Assignment>,
}

impl RunLoop {
    async fn run(mut self) {
        tracing::info!(worker_id = %self.id, "Worker started");

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                registered = self.pool.register(self.handle.clone()) => {
                    if let Err(e) = registered {
                        tracing::error!(worker_id = %self.id, error = %e, "Worker failed to register");
                        break;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                assignment = self.inbox.recv() => match assignment {
                    Some(assignment) => {
                        self.pool.execute(self.id, assignment).await;
                    }
                    None => break,
                },
            }
        }

        self.pool.withdraw(self.id);
        self.inbox.close();
        while let Ok(assignment) = self.inbox.try_recv() {
            self.pool.return_assignment(assignment);
        }

        tracing::info!(worker_id = %self.id, "Worker stopping");
    }
}
