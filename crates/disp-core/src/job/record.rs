use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

use super::context::JobContext;
use super::traits::{Delay, FnWork, Work};

/// One unit of schedulable work.
///
/// A job is immutable once built and is moved, never shared: from the caller
/// into the queue, from the dispatch loop to a worker. The name is for logs
/// and outcomes only and plays no part in routing.
pub struct Job {
    id: Uuid,
    name: String,
    timeout: Option<Duration>,
    submitted_at: DateTime<Utc>,
    work: Box<dyn Work>,
}

impl Job {
    /// Create a job carrying arbitrary work.
    pub fn new(name: impl Into<String>, work: impl Work) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timeout: None,
            submitted_at: Utc::now(),
            work: Box::new(work),
        }
    }

    /// Create a job that simulates work by sleeping.
    pub fn delay(name: impl Into<String>, duration: Duration) -> Self {
        Self::new(name, Delay::new(duration))
    }

    /// Create a job from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(name, FnWork::new(f))
    }

    /// Bound the execution time of this job.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn work(&self) -> &dyn Work {
        self.work.as_ref()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}
