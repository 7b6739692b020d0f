mod dispatcher;
mod drain;
mod pool;
pub mod queue;
mod worker;

pub use disp_core::config::{DispatchOrder, DispatcherConfig};
pub use dispatcher::{Dispatcher, DispatcherHandle, ShutdownReport};
pub use drain::{DrainResult, DrainTracker, InFlightGuard};
pub use pool::{Assignment, ReadyHandle, WorkerPool};
pub use queue::{JobReceiver, JobSender};
pub use worker::{PoolWorker, Worker};
