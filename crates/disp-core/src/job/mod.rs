mod context;
mod record;
mod traits;

pub use context::JobContext;
pub use record::Job;
pub use traits::{Delay, FnWork, Work};
