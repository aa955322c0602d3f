//! Board-level helpers for the position analyzer.
//!
//! Move generation and legality come from `cozy-chess`; this crate adds the
//! pieces the pipeline needs on top: normalized position keys, SAN in both
//! directions, and a tolerant PGN reader.

pub mod converters;
pub mod fen;
pub mod pgn;
pub mod position;
pub mod uci;

pub use converters::*;
pub use fen::{format_fen, parse_fen, FenError};
pub use pgn::{format_san, format_san_line, parse_pgn, parse_san, GameResult, PgnError, PgnGame, PgnMove, SanError};
pub use position::PositionKey;
pub use uci::{convert_uci_castling_to_cozy, format_uci_move};
