use std::time::Duration;

use thiserror::Error;

use crate::worker::WorkerId;

/// Core error type for dispatcher operations.
#[derive(Error, Debug)]
pub enum DispError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid worker count: {0} (at least one worker is required)")]
    InvalidWorkerCount(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Worker {worker_id} failed to start: {reason}")]
    WorkerStart { worker_id: WorkerId, reason: String },

    #[error("Worker {0} is already registered in the pool")]
    AlreadyRegistered(WorkerId),

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Job queue is full")]
    QueueFull,

    #[error("Job error: {0}")]
    Job(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispError {
    /// Shorthand for a job failure carrying a message.
    pub fn job(message: impl Into<String>) -> Self {
        Self::Job(message.into())
    }
}

impl From<serde_json::Error> for DispError {
    fn from(e: serde_json::Error) -> Self {
        DispError::Serialization(e.to_string())
    }
}

/// Result type alias using DispError.
pub type Result<T> = std::result::Result<T, DispError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DispError::InvalidWorkerCount(0);
        assert_eq!(
            err.to_string(),
            "Invalid worker count: 0 (at least one worker is required)"
        );

        let err = DispError::WorkerStart {
            worker_id: WorkerId::new(3),
            reason: "no runtime".to_string(),
        };
        assert_eq!(err.to_string(), "Worker 3 failed to start: no runtime");
    }

    #[test]
    fn test_job_shorthand() {
        let err = DispError::job("checksum mismatch");
        assert!(matches!(err, DispError::Job(ref m) if m == "checksum mismatch"));
    }
}
