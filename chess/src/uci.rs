//! UCI move notation helpers.

use cozy_chess::{Board, File, Move, Rank, Square};

use crate::converters::{format_piece, format_square};

/// Map a UCI castling move onto cozy-chess's king-takes-rook encoding.
///
/// UCI engines report castling as a two-square king move (e1g1), while
/// cozy-chess encodes it as the king moving onto its own rook (e1h1). The
/// conversion only applies when the king-to-rook move is legal.
pub fn convert_uci_castling_to_cozy(mv: Move, legal_moves: &[Move]) -> Move {
    let on_back_rank = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    if !on_back_rank || mv.from.file() != File::E || mv.promotion.is_some() {
        return mv;
    }

    let rook_file = match mv.to.file() {
        File::G => File::H,
        File::C => File::A,
        _ => return mv,
    };
    if mv.to.rank() != mv.from.rank() {
        return mv;
    }

    let converted = Move {
        from: mv.from,
        to: Square::new(rook_file, mv.from.rank()),
        promotion: None,
    };
    if legal_moves.contains(&converted) {
        converted
    } else {
        mv
    }
}

/// Resolve an engine-reported move against `board`, returning the legal
/// cozy-chess move it denotes.
pub fn resolve_uci_move(board: &Board, mv: Move) -> Option<Move> {
    let mut legal = Vec::new();
    board.generate_moves(|moves| {
        legal.extend(moves);
        false
    });
    let mv = convert_uci_castling_to_cozy(mv, &legal);
    legal.contains(&mv).then_some(mv)
}

/// Format a move in UCI notation (e.g., "e2e4", "e7e8q")
pub fn format_uci_move(mv: Move) -> String {
    let mut s = format!("{}{}", format_square(mv.from), format_square(mv.to));
    if let Some(promo) = mv.promotion {
        s.push(format_piece(promo));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use cozy_chess::Piece;

    fn mv(from: Square, to: Square) -> Move {
        Move {
            from,
            to,
            promotion: None,
        }
    }

    #[test]
    fn test_format_uci_move_with_promotion() {
        let m = Move {
            from: Square::new(File::E, Rank::Seventh),
            to: Square::new(File::E, Rank::Eighth),
            promotion: Some(Piece::Queen),
        };
        assert_eq!(format_uci_move(m), "e7e8q");
    }

    #[test]
    fn resolves_kingside_castling() {
        let board: Board = "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1".parse().unwrap();
        let uci = mv(Square::E1, Square::G1);
        assert_eq!(resolve_uci_move(&board, uci), Some(mv(Square::E1, Square::H1)));
    }

    #[test]
    fn resolves_queenside_castling_for_black() {
        let board: Board = "r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1".parse().unwrap();
        let uci = mv(Square::E8, Square::C8);
        assert_eq!(resolve_uci_move(&board, uci), Some(mv(Square::E8, Square::A8)));
    }

    #[test]
    fn rejects_illegal_move() {
        let board = Board::default();
        assert_eq!(resolve_uci_move(&board, mv(Square::E2, Square::E5)), None);
    }
}
