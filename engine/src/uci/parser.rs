use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};

use crate::uci::UciError;
use crate::{EngineInfo, Score};
use chess::{parse_san_piece, parse_square};
use cozy_chess::{Move, Piece};

type Tokens<'a> = Peekable<SplitWhitespace<'a>>;

/// Line received from the engine's stdout
#[derive(Debug, Clone)]
pub enum UciMessage {
    Id { name: String, value: String },
    UciOk,
    ReadyOk,
    /// `mv` is `None` for `bestmove (none)`, sent when the side to move has no legal moves.
    BestMove { mv: Option<Move>, ponder: Option<Move> },
    Info(EngineInfo),
}

pub fn parse_uci_message(line: &str) -> Result<UciMessage, UciError> {
    let mut tokens = line.split_whitespace().peekable();
    let malformed = || UciError::MalformedMessage(line.to_string());

    match tokens.next() {
        Some("uciok") => Ok(UciMessage::UciOk),
        Some("readyok") => Ok(UciMessage::ReadyOk),
        Some("id") => {
            let name = tokens.next().ok_or_else(malformed)?.to_string();
            let value = tokens.collect::<Vec<_>>().join(" ");
            if value.is_empty() {
                return Err(malformed());
            }
            Ok(UciMessage::Id { name, value })
        }
        Some("bestmove") => {
            let mv = match tokens.next().ok_or_else(malformed)? {
                "(none)" | "0000" => None,
                token => Some(parse_uci_move(token)?),
            };
            let ponder = match (tokens.next(), tokens.next()) {
                (Some("ponder"), Some(token)) => parse_uci_move(token).ok(),
                _ => None,
            };
            Ok(UciMessage::BestMove { mv, ponder })
        }
        Some("info") => Ok(UciMessage::Info(parse_info(tokens))),
        _ => Err(UciError::UnknownMessage(line.to_string())),
    }
}

/// Fields the engine did not send, or sent garbled, stay `None`.
fn parse_info(mut tokens: Tokens<'_>) -> EngineInfo {
    let mut info = EngineInfo::default();

    while let Some(field) = tokens.next() {
        match field {
            "depth" => info.depth = next_number(&mut tokens),
            "time" => info.time_ms = next_number(&mut tokens),
            "nodes" => info.nodes = next_number(&mut tokens),
            "multipv" => info.multipv = next_number(&mut tokens),
            "score" => info.score = next_score(&mut tokens),
            "wdl" => {
                let w = next_number(&mut tokens);
                let d = next_number(&mut tokens);
                let l = next_number(&mut tokens);
                info.wdl = w.zip(d).zip(l).map(|((w, d), l)| (w, d, l));
            }
            "pv" => {
                while let Some(token) = tokens.next_if(|t| !is_info_field(t)) {
                    if let Ok(mv) = parse_uci_move(token) {
                        info.pv.push(mv);
                    }
                }
            }
            // free text to end of line
            "string" => break,
            _ => {}
        }
    }

    info
}

fn next_number<T: FromStr>(tokens: &mut Tokens<'_>) -> Option<T> {
    tokens.next().and_then(|t| t.parse().ok())
}

/// `score cp <n>` or `score mate <n>`. A trailing `lowerbound`/`upperbound`
/// is left for the caller, which skips it as an unknown field.
fn next_score(tokens: &mut Tokens<'_>) -> Option<Score> {
    match tokens.next()? {
        "cp" => next_number(tokens).map(Score::Centipawns),
        "mate" => next_number(tokens).map(Score::Mate),
        _ => None,
    }
}

fn is_info_field(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "wdl"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
    )
}

/// Long algebraic move as UCI sends it: `e2e4`, `e7e8q`.
pub fn parse_uci_move(s: &str) -> Result<Move, UciError> {
    if !s.is_ascii() {
        return Err(UciError::InvalidMove(s.to_string()));
    }
    let (squares, promotion) = match s.len() {
        4 => (s, None),
        5 => (&s[..4], s[4..].chars().next()),
        _ => return Err(UciError::InvalidMove(s.to_string())),
    };

    let square = |text: &str| parse_square(text).ok_or_else(|| UciError::InvalidSquare(s.to_string()));
    let promotion = promotion
        .map(|c| {
            parse_san_piece(c.to_ascii_uppercase())
                .filter(|piece| *piece != Piece::King)
                .ok_or_else(|| UciError::InvalidPromotion(s.to_string()))
        })
        .transpose()?;

    Ok(Move {
        from: square(&squares[..2])?,
        to: square(&squares[2..])?,
        promotion,
    })
}
