//! Tokio implementation of the bounded-concurrency job dispatcher.
//!
//! A [`Dispatcher`] owns a pool of ready-worker registrations with capacity
//! equal to its worker count and routes every job taken from its queue to
//! exactly one idle [`Worker`]. At most `max_workers` jobs execute at once.

pub mod dispatch;
pub mod testing;

pub use dispatch::{
    queue, Assignment, DispatchOrder, Dispatcher, DispatcherConfig, DispatcherHandle, JobReceiver,
    JobSender, PoolWorker, ReadyHandle, ShutdownReport, Worker, WorkerPool,
};
