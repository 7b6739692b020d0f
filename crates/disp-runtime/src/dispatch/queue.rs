//! The inbound job queue shared between callers and the dispatch loop.

use disp_core::error::{DispError, Result};
use disp_core::job::Job;
use tokio::sync::mpsc;

/// Create a job queue that holds at most `capacity` pending jobs.
///
/// Submitting to a full queue waits until the dispatch loop makes room.
pub fn bounded(capacity: usize) -> Result<(JobSender, JobReceiver)> {
    if capacity == 0 {
        return Err(DispError::InvalidArgument(
            "job queue capacity must be greater than zero".to_string(),
        ));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((
        JobSender {
            inner: SenderInner::Bounded(tx),
        },
        JobReceiver {
            inner: ReceiverInner::Bounded(rx),
        },
    ))
}

/// Create a job queue without a capacity limit.
pub fn unbounded() -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        JobSender {
            inner: SenderInner::Unbounded(tx),
        },
        JobReceiver {
            inner: ReceiverInner::Unbounded(rx),
        },
    )
}

/// Create a queue from an optional capacity (`None` = unbounded).
pub fn channel(capacity: Option<usize>) -> Result<(JobSender, JobReceiver)> {
    match capacity {
        Some(capacity) => bounded(capacity),
        None => Ok(unbounded()),
    }
}

#[derive(Clone)]
enum SenderInner {
    Bounded(mpsc::Sender<Job>),
    Unbounded(mpsc::UnboundedSender<Job>),
}

/// Caller side of the job queue.
#[derive(Clone)]
pub struct JobSender {
    inner: SenderInner,
}

impl JobSender {
    /// Submit a job, waiting for room if the queue is bounded and full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        match &self.inner {
            SenderInner::Bounded(tx) => tx.send(job).await.map_err(|_| DispError::QueueClosed),
            SenderInner::Unbounded(tx) => tx.send(job).map_err(|_| DispError::QueueClosed),
        }
    }

    /// Submit a job without waiting.
    pub fn try_submit(&self, job: Job) -> Result<()> {
        match &self.inner {
            SenderInner::Bounded(tx) => tx.try_send(job).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispError::QueueClosed,
            }),
            SenderInner::Unbounded(tx) => tx.send(job).map_err(|_| DispError::QueueClosed),
        }
    }

    /// Check if the dispatcher has stopped taking jobs.
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            SenderInner::Bounded(tx) => tx.is_closed(),
            SenderInner::Unbounded(tx) => tx.is_closed(),
        }
    }
}

enum ReceiverInner {
    Bounded(mpsc::Receiver<Job>),
    Unbounded(mpsc::UnboundedReceiver<Job>),
}

/// Dispatcher side of the job queue.
pub struct JobReceiver {
    inner: ReceiverInner,
}

impl JobReceiver {
    /// Receive the next job. `None` once the queue is closed and empty.
    pub async fn recv(&mut self) -> Option<Job> {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.recv().await,
            ReceiverInner::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Take a buffered job without waiting.
    pub fn try_recv(&mut self) -> Option<Job> {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.try_recv().ok(),
            ReceiverInner::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Stop intake. Jobs already buffered can still be received.
    pub fn close(&mut self) {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.close(),
            ReceiverInner::Unbounded(rx) => rx.close(),
        }
    }
}
