//! The capability every analysis backend exposes to the worker pool.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send` and workers can run on `tokio::spawn`.
//! Implementations may still write `async fn` in their impl blocks.

use std::future::Future;

use cozy_chess::Board;

use crate::{EngineError, Evaluation};

/// One engine (local process or remote service) owned by exactly one worker.
///
/// Calls are sequential from the owner's point of view: a worker awaits each
/// call before issuing the next, so implementations never see overlapping
/// requests.
pub trait AnalysisClient: Send + 'static {
    /// Short label for logs, e.g. `stockfish-2`.
    fn label(&self) -> &str;

    /// Prepare for an unrelated position. With `reset_state`, clear any
    /// search state (hash tables) left over from earlier positions so that
    /// results do not depend on what was analyzed before.
    fn configure(
        &mut self,
        reset_state: bool,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Search `board` to exactly `depth` plies.
    fn analyze(
        &mut self,
        board: &Board,
        depth: u32,
    ) -> impl Future<Output = Result<Evaluation, EngineError>> + Send;

    /// Release the engine. Never fails; problems are logged.
    fn shutdown(self) -> impl Future<Output = ()> + Send;
}
