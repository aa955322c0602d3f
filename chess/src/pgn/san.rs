use cozy_chess::{Board, GameStatus, Move, Piece};

use crate::converters::{
    char_to_file, char_to_rank, file_to_char, parse_san_piece, parse_square, rank_to_char,
    san_piece_letter,
};
use crate::uci::format_uci_move;

fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

/// cozy-chess encodes castling as the king capturing its own rook.
fn is_castling(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.color_on(mv.to) == Some(board.side_to_move())
}

/// Format a legal move as SAN, including check and mate suffixes.
pub fn format_san(board: &Board, mv: Move) -> Result<String, SanError> {
    let legal = legal_moves(board);
    if !legal.contains(&mv) {
        return Err(SanError::IllegalMove(format_uci_move(mv)));
    }
    let piece = board
        .piece_on(mv.from)
        .ok_or_else(|| SanError::IllegalMove(format_uci_move(mv)))?;

    let mut san = String::new();
    if is_castling(board, mv) {
        if (mv.to.file() as u8) > (mv.from.file() as u8) {
            san.push_str("O-O");
        } else {
            san.push_str("O-O-O");
        }
    } else {
        let is_capture = board.piece_on(mv.to).is_some()
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

        if piece == Piece::Pawn {
            if is_capture {
                san.push(file_to_char(mv.from.file()));
            }
        } else {
            san.push(san_piece_letter(piece));
            let rivals: Vec<&Move> = legal
                .iter()
                .filter(|other| {
                    other.to == mv.to
                        && other.from != mv.from
                        && board.piece_on(other.from) == Some(piece)
                })
                .collect();
            if !rivals.is_empty() {
                let file_unique = rivals.iter().all(|o| o.from.file() != mv.from.file());
                let rank_unique = rivals.iter().all(|o| o.from.rank() != mv.from.rank());
                if file_unique {
                    san.push(file_to_char(mv.from.file()));
                } else if rank_unique {
                    san.push(rank_to_char(mv.from.rank()));
                } else {
                    san.push(file_to_char(mv.from.file()));
                    san.push(rank_to_char(mv.from.rank()));
                }
            }
        }

        if is_capture {
            san.push('x');
        }
        san.push(file_to_char(mv.to.file()));
        san.push(rank_to_char(mv.to.rank()));

        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(san_piece_letter(promo));
        }
    }

    let mut after = board.clone();
    after.play_unchecked(mv);
    if after.status() == GameStatus::Won {
        san.push('#');
    } else if !after.checkers().is_empty() {
        san.push('+');
    }
    Ok(san)
}

/// Format a sequence of moves played from `board` as SAN.
pub fn format_san_line(board: &Board, moves: &[Move]) -> Result<Vec<String>, SanError> {
    let mut board = board.clone();
    let mut line = Vec::with_capacity(moves.len());
    for &mv in moves {
        line.push(format_san(&board, mv)?);
        board.play_unchecked(mv);
    }
    Ok(line)
}

/// Parse a SAN move against the legal moves of `board`.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let trimmed = san.trim().trim_end_matches(['+', '#', '!', '?']);
    if trimmed.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let legal = legal_moves(board);

    let castle_kingside = matches!(trimmed, "O-O" | "0-0");
    let castle_queenside = matches!(trimmed, "O-O-O" | "0-0-0");
    if castle_kingside || castle_queenside {
        return legal
            .iter()
            .copied()
            .find(|&mv| {
                is_castling(board, mv)
                    && ((mv.to.file() as u8) > (mv.from.file() as u8)) == castle_kingside
            })
            .ok_or_else(|| SanError::NoLegalMove(san.to_string()));
    }

    let mut chars: Vec<char> = trimmed.chars().filter(|c| !matches!(c, 'x' | '-' | ':')).collect();

    let piece = match chars.first().copied().and_then(parse_san_piece) {
        Some(piece) => {
            chars.remove(0);
            piece
        }
        None => Piece::Pawn,
    };

    let mut promotion = None;
    if piece == Piece::Pawn {
        if let Some(&last) = chars.last() {
            if let Some(promo) = parse_san_piece(last) {
                promotion = Some(promo);
                chars.pop();
                if chars.last() == Some(&'=') {
                    chars.pop();
                }
            }
        }
    }

    if chars.len() < 2 {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let dest: String = chars[chars.len() - 2..].iter().collect();
    let to = parse_square(&dest).ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;
    let hint = &chars[..chars.len() - 2];
    if hint.len() > 2 {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let mut from_file = None;
    let mut from_rank = None;
    for &c in hint {
        if let Some(file) = char_to_file(c) {
            from_file = Some(file);
        } else if let Some(rank) = char_to_rank(c) {
            from_rank = Some(rank);
        } else {
            return Err(SanError::InvalidFormat(san.to_string()));
        }
    }

    let candidates: Vec<Move> = legal
        .into_iter()
        .filter(|&mv| {
            mv.to == to
                && board.piece_on(mv.from) == Some(piece)
                && !is_castling(board, mv)
                && mv.promotion == promotion
                && from_file.map_or(true, |f| mv.from.file() == f)
                && from_rank.map_or(true, |r| mv.from.rank() == r)
        })
        .collect();

    match candidates.as_slice() {
        [mv] => Ok(*mv),
        [] => Err(SanError::NoLegalMove(san.to_string())),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Illegal move: {0}")]
    IllegalMove(String),
}
