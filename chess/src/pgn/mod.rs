pub mod parser;
pub mod san;

pub use parser::{parse_pgn, parse_pgn_games, GameResult, PgnError, PgnGame, PgnMove};
pub use san::{format_san, format_san_line, parse_san, SanError};
