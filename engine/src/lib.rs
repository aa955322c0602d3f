pub mod client;
pub mod error;
pub mod evaluation;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod remote;
pub mod stockfish;
pub mod uci;

pub use client::AnalysisClient;
pub use error::EngineError;
pub use evaluation::Evaluation;
pub use remote::{RemoteClient, RemoteConfig};
pub use stockfish::{StockfishConfig, StockfishEngine};
pub use uci::{UciError, UciMessage};

use cozy_chess::Move;

/// Parameters for the "go" command. Every search is depth-limited.
#[derive(Debug, Clone, Copy)]
pub struct GoParams {
    pub depth: u32,
}

impl GoParams {
    pub fn depth(depth: u32) -> Self {
        Self { depth }
    }

    /// Render as a UCI `go` line (without trailing newline).
    pub fn to_command(&self) -> String {
        format!("go depth {}", self.depth)
    }
}

/// Events received from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// `uciok` or `readyok`
    Ready,
    /// `bestmove`; `None` when the engine reports `(none)` in a terminal position
    BestMove(Option<Move>),
    Info(EngineInfo),
}

/// Engine analysis information
#[derive(Debug, Clone, Default)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    /// Win/draw/loss in permille from the side to move (`UCI_ShowWDL`)
    pub wdl: Option<(u32, u32, u32)>,
    pub pv: Vec<Move>, // Principal variation
    pub multipv: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32), // Negative for being mated
}
