use std::time::Duration;

use crate::uci::UciError;

/// Failure of a single engine interaction.
///
/// Every variant is scoped to one request: the pipeline treats it as a
/// failed work item, never as a reason to stop the run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine executable not found")]
    NotFound,
    #[error("Failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("UCI error: {0}")]
    Uci(#[from] UciError),
    #[error("Engine closed its output stream")]
    Closed,
    #[error("Timed out waiting for {0}")]
    Handshake(&'static str),
    #[error("Search at depth {depth} did not finish within {limit:?}")]
    Timeout { depth: u32, limit: Duration },
    #[error("Engine returned no best move")]
    NoBestMove,
    #[error("Engine reported no score")]
    MissingScore,
    #[error("Engine reported an out-of-range {0}")]
    Malformed(&'static str),
    #[error("Engine returned an empty principal variation")]
    EmptyPrincipalVariation,
    #[error("Engine returned an illegal principal variation: {0}")]
    IllegalVariation(#[from] chess::SanError),
    #[error("Analysis service returned HTTP {status}")]
    HttpStatus { status: u16 },
    #[error("Analysis service request failed: {0}")]
    Http(#[from] reqwest::Error),
}
