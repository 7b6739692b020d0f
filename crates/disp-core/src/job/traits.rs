use std::future::Future;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::error::Result;

use super::context::JobContext;

/// The opaque unit of work a job carries.
///
/// The dispatcher never inspects what a job does; it only hands the work a
/// [`JobContext`] and awaits the result on whichever worker claimed it.
pub trait Work: Send + Sync + 'static {
    /// Execute the work.
    fn execute(&self, ctx: JobContext) -> BoxFuture<'_, Result<()>>;
}

/// Simulated work: blocks the worker for a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    duration: Duration,
}

impl Delay {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Work for Delay {
    fn execute(&self, ctx: JobContext) -> BoxFuture<'_, Result<()>> {
        let duration = self.duration;
        async move {
            tracing::info!(
                worker_id = %ctx.worker_id,
                job = %ctx.job_name,
                seconds = duration.as_secs_f64(),
                "Blocking for simulated work"
            );
            tokio::time::sleep(duration).await;
            Ok(())
        }
        .boxed()
    }
}

/// Work backed by an async closure.
pub struct FnWork<F> {
    f: F,
}

impl<F> FnWork<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Work for FnWork<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn execute(&self, ctx: JobContext) -> BoxFuture<'_, Result<()>> {
        (self.f)(ctx).boxed()
    }
}
