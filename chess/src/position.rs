//! Normalized position keys.
//!
//! A key is the first four FEN fields: placement, side to move, castling
//! rights and en passant. Move counters are dropped so that transpositions
//! reached at different move numbers share one cache entry. The en passant
//! field is kept only when an en passant capture is actually legal; otherwise
//! two identical positions would differ just because the last move happened
//! to be a double pawn push.

use std::fmt;
use std::str::FromStr;

use cozy_chess::{Board, Color, Piece, Rank, Square};
use serde::{Deserialize, Serialize};

use crate::fen::{parse_fen, FenError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    pub fn from_board(board: &Board) -> Self {
        let fen = board.to_string();
        let mut fields = fen.split_whitespace();
        let placement = fields.next().unwrap_or_default();
        let side = fields.next().unwrap_or("w");
        let castling = fields.next().unwrap_or("-");
        let en_passant = match fields.next() {
            Some(ep) if has_legal_en_passant(board) => ep,
            _ => "-",
        };
        Self(format!("{placement} {side} {castling} {en_passant}"))
    }

    /// Parse any FEN (four or six fields) and normalize it.
    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        Ok(Self::from_board(&parse_fen(fen)?))
    }

    /// Rebuild a board from the key. Move counters come back as `0 1`.
    pub fn to_board(&self) -> Result<Board, FenError> {
        parse_fen(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PositionKey {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_fen(s)
    }
}

impl AsRef<str> for PositionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn has_legal_en_passant(board: &Board) -> bool {
    let Some(file) = board.en_passant() else {
        return false;
    };
    let rank = match board.side_to_move() {
        Color::White => Rank::Sixth,
        Color::Black => Rank::Third,
    };
    let target = Square::new(file, rank);
    let mut found = false;
    board.generate_moves(|moves| {
        if moves.piece == Piece::Pawn && moves.to.has(target) {
            found = true;
        }
        found
    });
    found
}
