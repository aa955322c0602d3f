//! Loading positions to analyze from PGN files and FEN lists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chess::pgn::parse_pgn_games;
use chess::PositionKey;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read a file as text, replacing invalid UTF-8.
fn read_lossy(path: &Path) -> Result<String, InputError> {
    let bytes = std::fs::read(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Positions reached after every mainline move of every game in a PGN file.
pub fn load_pgn_positions(path: &Path) -> Result<Vec<PositionKey>, InputError> {
    let text = read_lossy(path)?;
    let keys = pgn_positions(&text);
    tracing::info!(path = %path.display(), positions = keys.len(), "Loaded PGN");
    Ok(keys)
}

pub fn pgn_positions(text: &str) -> Vec<PositionKey> {
    let mut keys = Vec::new();
    for (index, game) in parse_pgn_games(text).into_iter().enumerate() {
        match game {
            Ok(game) => keys.extend(game.positions().map(|board| PositionKey::from_board(&board))),
            Err(e) => tracing::warn!(game = index + 1, "Skipping unreadable game: {}", e),
        }
    }
    keys
}

/// One FEN per line; blank lines and `#` comments are ignored.
pub fn load_position_list(path: &Path) -> Result<Vec<PositionKey>, InputError> {
    let text = read_lossy(path)?;
    let keys = parse_position_list(&text);
    tracing::info!(path = %path.display(), positions = keys.len(), "Loaded position list");
    Ok(keys)
}

pub fn parse_position_list(text: &str) -> Vec<PositionKey> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            match PositionKey::from_fen(line) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(line = index + 1, "Skipping invalid FEN: {}", e);
                    None
                }
            }
        })
        .collect()
}

pub fn unique_positions(keys: impl IntoIterator<Item = PositionKey>) -> HashSet<PositionKey> {
    keys.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_transpositions_collapse_to_one_key() {
        let pgn = r#"[Event "A"]

1. Nf3 Nf6 2. Nc3 Nc6 1/2-1/2

[Event "B"]

1. Nc3 Nc6 2. Nf3 Nf6 1/2-1/2
"#;
        let keys = pgn_positions(pgn);
        assert_eq!(keys.len(), 8);
        let unique = unique_positions(keys);
        // the final positions coincide; the first three plies of each game differ
        assert_eq!(unique.len(), 7);
    }

    #[test]
    fn test_pgn_yields_position_after_each_move() {
        let keys = pgn_positions("1. e4 e5 *");
        assert_eq!(
            keys,
            vec![
                PositionKey::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap(),
                PositionKey::from_fen("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2").unwrap(),
            ]
        );
    }

    #[test]
    fn test_bad_game_is_skipped() {
        let pgn = "[Event \"x\"]\n\n1. e4 Ke5 *\n\n[Event \"y\"]\n\n1. d4 *\n";
        let keys = pgn_positions(pgn);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_position_list_skips_comments_and_garbage() {
        let text = "# openings\n\nrnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1\nnot a fen\n  8/8/8/8/8/8/8/K6k w - -  \n";
        let keys = parse_position_list(text);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].as_str(), "8/8/8/8/8/8/8/K6k w - -");
    }

    #[test]
    fn test_load_from_files_with_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"[Event \"Caf\xe9\"]\n\n1. e4 *\n").unwrap();
        drop(file);

        assert_eq!(load_pgn_positions(&path).unwrap().len(), 1);
        assert!(matches!(
            load_position_list(&dir.path().join("missing.txt")),
            Err(InputError::Read { .. })
        ));
    }
}
