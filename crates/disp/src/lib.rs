//! disp - a bounded-concurrency job dispatcher.
//!
//! Jobs submitted to a queue are routed to a fixed pool of workers; at most
//! `max_workers` jobs execute at once and every job reaches exactly one
//! worker. What a job does is opaque to the dispatcher.

#[doc(hidden)]
pub use disp_core;
#[doc(hidden)]
pub use disp_runtime;

/// Prelude module for common imports.
pub mod prelude {
    pub use disp_core::config::{DispConfig, DispatchOrder, DispatcherConfig};
    pub use disp_core::error::{DispError, Result};
    pub use disp_core::job::{Delay, FnWork, Job, JobContext, Work};
    pub use disp_core::outcome::{JobOutcome, OutcomeStatus};
    pub use disp_core::worker::WorkerId;
    pub use disp_runtime::{
        queue, Dispatcher, DispatcherHandle, JobReceiver, JobSender, PoolWorker, ShutdownReport,
        Worker, WorkerPool,
    };
}
