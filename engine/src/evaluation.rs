//! The per-depth evaluation record returned by every analysis client.
//!
//! Field names on the wire (`ev`, `wdl`, `best`, `pv`, `time`, `nodes`) match
//! the JSON an analysis service returns and the layout stored in the result
//! cache. All scores are from White's point of view.

use cozy_chess::{Board, Color};
use serde::{Deserialize, Serialize};

use crate::{EngineError, EngineInfo, Score};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Centipawns for White; `None` when the engine reports a forced mate.
    #[serde(rename = "ev")]
    pub score_cp: Option<i32>,
    /// Moves to mate, positive when White mates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
    /// Expected score for White in `0.0..=1.0`.
    #[serde(rename = "wdl")]
    pub expectation: Option<f64>,
    /// Best move in SAN.
    #[serde(rename = "best")]
    pub best_move: String,
    /// Principal variation in SAN, starting with `best_move`.
    pub pv: Vec<String>,
    /// Search time in seconds.
    #[serde(rename = "time")]
    pub elapsed_secs: f64,
    pub nodes: u64,
}

impl Evaluation {
    /// Build an evaluation from the last `info` line of a search.
    ///
    /// UCI reports scores from the side to move; they are flipped to White's
    /// perspective here. The PV is rendered in SAN against `board`.
    pub fn from_engine_info(
        board: &Board,
        info: &EngineInfo,
        fallback_elapsed_secs: f64,
    ) -> Result<Self, EngineError> {
        let white_to_move = board.side_to_move() == Color::White;
        let for_white = |value: i32, what: &'static str| {
            if white_to_move {
                Ok(value)
            } else {
                value.checked_neg().ok_or(EngineError::Malformed(what))
            }
        };
        let (score_cp, mate) = match info.score {
            Some(Score::Centipawns(cp)) => (Some(for_white(cp, "centipawn score")?), None),
            Some(Score::Mate(m)) => (None, Some(for_white(m, "mate score")?)),
            None => (None, None),
        };
        let expectation = info.wdl.map(|(w, d, l)| {
            let total = (u64::from(w) + u64::from(d) + u64::from(l)).max(1) as f64;
            let side_to_move = (f64::from(w) + f64::from(d) / 2.0) / total;
            if white_to_move {
                side_to_move
            } else {
                1.0 - side_to_move
            }
        });

        let mut moves = Vec::with_capacity(info.pv.len());
        let mut walk = board.clone();
        for &mv in &info.pv {
            let mv = chess::uci::resolve_uci_move(&walk, mv).ok_or_else(|| {
                chess::SanError::IllegalMove(chess::format_uci_move(mv))
            })?;
            walk.play_unchecked(mv);
            moves.push(mv);
        }
        let pv = chess::format_san_line(board, &moves)?;

        let evaluation = Self {
            score_cp,
            mate,
            expectation,
            best_move: pv.first().cloned().unwrap_or_default(),
            pv,
            elapsed_secs: info
                .time_ms
                .map(|ms| ms as f64 / 1000.0)
                .unwrap_or(fallback_elapsed_secs),
            nodes: info.nodes.unwrap_or(0),
        };
        evaluation.validated()
    }

    /// Reject records that cannot be cached: no score or no best line.
    pub fn validated(self) -> Result<Self, EngineError> {
        if self.pv.is_empty() || self.best_move.is_empty() {
            return Err(EngineError::EmptyPrincipalVariation);
        }
        if self.score_cp.is_none() && self.mate.is_none() {
            return Err(EngineError::MissingScore);
        }
        Ok(self)
    }
}
