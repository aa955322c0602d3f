use cozy_chess::{Board, Move};
use std::collections::HashMap;

use super::san::{parse_san, SanError};
use crate::fen::{parse_fen, FenError};

/// A parsed PGN game (mainline only; variations are skipped)
#[derive(Debug, Clone)]
pub struct PgnGame {
    pub tags: HashMap<String, String>,
    pub start: Board,
    pub moves: Vec<PgnMove>,
    pub result: GameResult,
}

/// A single move in PGN with metadata
#[derive(Debug, Clone)]
pub struct PgnMove {
    pub mv: Move,
    pub san: String,
    pub comment: Option<String>,
    pub nags: Vec<u8>, // Numeric Annotation Glyphs (!!, ?, etc.)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Ongoing,
}

impl GameResult {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "1-0" => Some(Self::WhiteWins),
            "0-1" => Some(Self::BlackWins),
            "1/2-1/2" => Some(Self::Draw),
            "*" => Some(Self::Ongoing),
            _ => None,
        }
    }
}

impl PgnGame {
    /// Boards reached after each mainline move, in order.
    pub fn positions(&self) -> impl Iterator<Item = Board> + '_ {
        self.moves.iter().scan(self.start.clone(), |board, m| {
            board.play_unchecked(m.mv);
            Some(board.clone())
        })
    }
}

/// Parse the first game of a PGN string.
pub fn parse_pgn(input: &str) -> Result<PgnGame, PgnError> {
    parse_pgn_games(input)
        .into_iter()
        .next()
        .unwrap_or(Err(PgnError::InvalidFormat))
}

/// Parse every game in a PGN string. Each game succeeds or fails on its own.
pub fn parse_pgn_games(input: &str) -> Vec<Result<PgnGame, PgnError>> {
    split_games(input).iter().map(|text| parse_game(text)).collect()
}

fn split_games(input: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut in_movetext = false;

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && in_movetext {
            games.push(std::mem::take(&mut current));
            in_movetext = false;
        }
        if !trimmed.is_empty() && !trimmed.starts_with('[') && !trimmed.starts_with('%') {
            in_movetext = true;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        games.push(current);
    }
    games
}

fn parse_game(text: &str) -> Result<PgnGame, PgnError> {
    let mut tags = HashMap::new();
    let mut movetext = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if movetext.trim().is_empty() && trimmed.starts_with('[') {
            let (name, value) = parse_tag(trimmed)?;
            tags.insert(name, value);
        } else if !trimmed.starts_with('%') {
            movetext.push_str(line);
            movetext.push('\n');
        }
    }

    let start = match tags.get("FEN") {
        Some(fen) => parse_fen(fen)?,
        None => Board::default(),
    };
    let mut game = PgnGame {
        result: tags
            .get("Result")
            .and_then(|r| GameResult::from_token(r))
            .unwrap_or(GameResult::Ongoing),
        tags,
        start,
        moves: Vec::new(),
    };

    let mut board = game.start.clone();
    for token in tokenize(&movetext) {
        match token {
            Token::Comment(text) => {
                if let Some(last) = game.moves.last_mut() {
                    last.comment = Some(text);
                }
            }
            Token::Nag(nag) => {
                if let Some(last) = game.moves.last_mut() {
                    last.nags.push(nag);
                }
            }
            Token::Result(result) => game.result = result,
            Token::San(san) => {
                let mv = parse_san(&board, &san).map_err(|source| PgnError::San {
                    ply: game.moves.len() + 1,
                    source,
                })?;
                board.play_unchecked(mv);
                game.moves.push(PgnMove {
                    mv,
                    san,
                    comment: None,
                    nags: Vec::new(),
                });
            }
        }
    }

    Ok(game)
}

fn parse_tag(line: &str) -> Result<(String, String), PgnError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let (name, value) = inner
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let value = value
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    Ok((name.to_string(), value.replace("\\\"", "\"")))
}

#[derive(Debug, PartialEq)]
enum Token {
    San(String),
    Comment(String),
    Nag(u8),
    Result(GameResult),
}

fn tokenize(movetext: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = movetext.chars().peekable();
    let mut variation_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let comment: String = chars.by_ref().take_while(|&c| c != '}').collect();
                if variation_depth == 0 {
                    tokens.push(Token::Comment(comment.trim().to_string()));
                }
            }
            ';' => {
                chars.by_ref().take_while(|&c| c != '\n').for_each(drop);
            }
            '(' => variation_depth += 1,
            ')' => variation_depth = variation_depth.saturating_sub(1),
            '$' => {
                let mut digits = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                    digits.push(d);
                }
                if variation_depth == 0 {
                    if let Ok(nag) = digits.parse() {
                        tokens.push(Token::Nag(nag));
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => {
                let mut word = String::from(c);
                while let Some(next) =
                    chars.next_if(|n| !n.is_whitespace() && !"{}();$".contains(*n))
                {
                    word.push(next);
                }
                if variation_depth > 0 {
                    continue;
                }
                if let Some(result) = GameResult::from_token(&word) {
                    tokens.push(Token::Result(result));
                    continue;
                }
                let san = strip_move_number(&word);
                if !san.is_empty() {
                    tokens.push(Token::San(san.to_string()));
                }
            }
        }
    }
    tokens
}

/// "12." and "12..." are move numbers; "12.e4" carries its move inline.
/// "0-0" is castling, not a number.
fn strip_move_number(word: &str) -> &str {
    match word.find(|c: char| !(c.is_ascii_digit() || c == '.')) {
        Some(i) if word[..i].contains('.') => &word[i..],
        Some(_) => word,
        None => "",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("Invalid PGN format")]
    InvalidFormat,
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
    #[error("Invalid FEN tag: {0}")]
    Fen(#[from] FenError),
    #[error("SAN parse error at ply {ply}: {source}")]
    San { ply: usize, source: SanError },
}
