pub mod config;
pub mod error;
pub mod job;
pub mod outcome;
pub mod worker;

pub use config::DispConfig;
pub use error::{DispError, Result};
pub use job::{Delay, FnWork, Job, JobContext, Work};
pub use outcome::{JobOutcome, OutcomeStatus};
pub use worker::WorkerId;
