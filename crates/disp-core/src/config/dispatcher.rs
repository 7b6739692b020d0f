use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispError, Result};

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of workers, which is also the pool capacity.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Capacity of the job queue (unset = unbounded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// How queued jobs are matched to idle workers.
    #[serde(default)]
    pub order: DispatchOrder,

    /// Maximum time shutdown waits for in-flight jobs, in milliseconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,

    /// How often shutdown re-checks the in-flight count, in milliseconds.
    #[serde(default = "default_drain_poll_interval")]
    pub drain_poll_interval_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            queue_capacity: None,
            order: DispatchOrder::default(),
            drain_timeout_ms: default_drain_timeout(),
            drain_poll_interval_ms: default_drain_poll_interval(),
        }
    }
}

impl DispatcherConfig {
    /// Default configuration with the given worker count.
    pub fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers,
            ..Default::default()
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(DispError::InvalidWorkerCount(self.max_workers));
        }
        if self.queue_capacity == Some(0) {
            return Err(DispError::Config(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_workers() -> usize {
    4
}

fn default_drain_timeout() -> u64 {
    30_000
}

fn default_drain_poll_interval() -> u64 {
    50
}

/// Strategy for matching queued jobs to idle workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOrder {
    /// Each dequeued job claims a worker on its own task. Jobs waiting for a
    /// worker race for the pool, so assignment order is not submission order.
    #[default]
    Concurrent,
    /// The dispatch loop claims a worker before taking the next job, so
    /// workers are assigned in dequeue order.
    Fifo,
}
