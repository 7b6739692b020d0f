use uuid::Uuid;

use crate::worker::WorkerId;

/// Context handed to a job's work when a worker executes it.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: Uuid,
    /// Job name (observability only).
    pub job_name: String,
    /// Worker executing the job.
    pub worker_id: WorkerId,
    /// Dispatch sequence number, in dequeue order.
    pub seq: u64,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job_id: Uuid, job_name: impl Into<String>, worker_id: WorkerId, seq: u64) -> Self {
        Self {
            job_id,
            job_name: job_name.into(),
            worker_id,
            seq,
        }
    }

    /// Build a tracing span carrying the job's identifying fields.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job = %self.job_name,
            worker_id = %self.worker_id,
            seq = self.seq
        )
    }
}
