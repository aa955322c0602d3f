//! The concurrent analysis pipeline.
//!
//! ```text
//! keys -> plan_work (cache lookup, shuffle) -> work channel -> WorkerPool
//!      -> result channel -> Coordinator -> ResultCache (+ checkpoints)
//! ```

mod coordinator;
mod dispatch;
mod progress;
mod signal;
mod types;
mod worker;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{Coordinator, Phase, PipelineError, RunReport, RunStats};
pub use signal::{spawn_signal_listener, ShutdownSignal, ShutdownTrigger};
pub use types::{AnalysisResult, DepthRange, DepthRecord, ItemError, WorkItem, WorkerResponse};
pub use worker::{PoolClosed, WorkerExit, WorkerPool};
