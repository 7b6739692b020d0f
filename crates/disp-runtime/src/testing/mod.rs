//! Instrumentation for exercising a dispatcher in tests.
//!
//! A [`Probe`] hands out jobs whose work records when and where it ran, so
//! tests can check capacity, per-worker exclusivity and completion counts
//! without relying on log output.

mod probe;

pub use probe::{Execution, Probe};

use std::time::Duration;

/// Default time tests wait for an expected condition.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);
