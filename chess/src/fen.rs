use cozy_chess::Board;

/// Parse a FEN string into a Board.
///
/// Accepts both full six-field FEN and the four-field form used for
/// position keys; missing move counters default to `0 1`. An en passant
/// square that the board rejects is dropped rather than failing the parse.
pub fn parse_fen(fen: &str) -> Result<Board, FenError> {
    let mut fields: Vec<&str> = fen.split_whitespace().collect();
    match fields.len() {
        0 => return Err(FenError::Empty),
        1..=3 => return Err(FenError::InvalidFormat(fen.to_string())),
        4 => fields.extend(["0", "1"]),
        5 => fields.push("1"),
        _ => fields.truncate(6),
    }

    if let Ok(board) = fields.join(" ").parse::<Board>() {
        return Ok(board);
    }
    if fields[3] != "-" {
        fields[3] = "-";
        if let Ok(board) = fields.join(" ").parse::<Board>() {
            return Ok(board);
        }
    }
    Err(FenError::InvalidFormat(fen.to_string()))
}

/// Format a Board as a full FEN string
pub fn format_fen(board: &Board) -> String {
    board.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("Empty FEN")]
    Empty,
    #[error("Invalid FEN: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn parses_full_fen() {
        let board = parse_fen(START_FEN).unwrap();
        assert_eq!(board, Board::default());
    }

    #[test]
    fn parses_four_field_fen() {
        let board = parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -").unwrap();
        assert_eq!(format_fen(&board), START_FEN);
    }

    #[test]
    fn rejects_truncated_fen() {
        assert!(matches!(parse_fen(""), Err(FenError::Empty)));
        assert!(matches!(
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w"),
            Err(FenError::InvalidFormat(_))
        ));
        assert!(parse_fen("not a fen at all").is_err());
    }
}
