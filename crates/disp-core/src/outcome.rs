use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::worker::WorkerId;

/// Record of one job execution, published to the caller's outcome sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub job_name: String,
    pub seq: u64,
    pub worker_id: WorkerId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: OutcomeStatus,
}

impl JobOutcome {
    /// Check if execution was successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Wall-clock time spent executing.
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// How a job execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed { error: String },
    Panicked { message: String },
    TimedOut { after: Duration },
}

impl OutcomeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Panicked { .. } => "panicked",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: OutcomeStatus) -> JobOutcome {
        let started_at = Utc::now();
        JobOutcome {
            job_id: Uuid::new_v4(),
            job_name: "validate".to_string(),
            seq: 1,
            worker_id: WorkerId::new(1),
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(250),
            status,
        }
    }

    #[test]
    fn test_success() {
        assert!(outcome(OutcomeStatus::Completed).is_success());
        assert!(!outcome(OutcomeStatus::Failed {
            error: "bad yaml".to_string()
        })
        .is_success());
    }

    #[test]
    fn test_elapsed() {
        assert_eq!(
            outcome(OutcomeStatus::Completed).elapsed(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(OutcomeStatus::Failed {
            error: "bad yaml".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "bad yaml");

        assert_eq!(
            OutcomeStatus::TimedOut {
                after: Duration::from_secs(1)
            }
            .as_str(),
            "timed_out"
        );
    }
}
