//! UCI subprocess client.
//!
//! One `StockfishEngine` wraps one engine process. A background task reads
//! the engine's stdout, parses each line, and forwards the interesting ones
//! as [`EngineEvent`]s; commands are written straight to stdin by the owner.

use crate::uci::{parse_uci_message, UciMessage};
use crate::{AnalysisClient, EngineError, EngineEvent, EngineInfo, Evaluation, GoParams};
use cozy_chess::{Board, Move};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_GRACE: Duration = Duration::from_secs(2);
const QUIT_GRACE: Duration = Duration::from_secs(1);

pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    event_rx: mpsc::Receiver<EngineEvent>,
    label: String,
    search_timeout: Option<Duration>,
    /// Searches whose `stop` went unanswered. Each still owes one `bestmove`,
    /// which must not be mistaken for the answer to a later `go`.
    stale_searches: usize,
}

/// Configuration for engine performance tuning.
#[derive(Debug, Clone, Default)]
pub struct StockfishConfig {
    /// Engine executable; searched in common locations when `None`.
    pub path: Option<PathBuf>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
    /// Upper bound for a single `go depth N` call.
    pub search_timeout: Option<Duration>,
    pub label: Option<String>,
}

impl StockfishEngine {
    /// Spawn an engine process and complete the UCI handshake.
    #[tracing::instrument(level = "info", skip(config), fields(label = ?config.label))]
    pub async fn spawn_with_config(config: StockfishConfig) -> Result<Self, EngineError> {
        let path = match &config.path {
            Some(path) => path.clone(),
            None => find_stockfish_path().ok_or(EngineError::NotFound)?,
        };
        let label = config.label.clone().unwrap_or_else(|| "stockfish".to_string());
        tracing::info!("Spawning engine at {:?}", path);

        let mut process = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn engine: {}", e);
                EngineError::Spawn(e)
            })?;

        let stdin = process.stdin.take().ok_or(EngineError::Closed)?;
        let stdout = process.stdout.take().ok_or(EngineError::Closed)?;

        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(256);
        tokio::spawn(read_engine_output(stdout, event_tx, label.clone()));

        let mut engine = Self {
            process,
            stdin,
            event_rx,
            label,
            search_timeout: config.search_timeout,
            stale_searches: 0,
        };

        engine.send("uci").await?;
        engine.wait_ready("uciok").await?;

        if let Some(threads) = config.threads {
            let threads = threads.clamp(1, 512);
            tracing::info!("Setting Threads to {}", threads);
            engine.set_option("Threads", Some(&threads.to_string())).await?;
        }
        if let Some(hash_mb) = config.hash_mb {
            let hash_mb = hash_mb.clamp(1, 32768);
            tracing::info!("Setting Hash to {} MB", hash_mb);
            engine.set_option("Hash", Some(&hash_mb.to_string())).await?;
        }
        engine.set_option("UCI_ShowWDL", Some("true")).await?;

        engine.send("isready").await?;
        engine.wait_ready("readyok").await?;

        tracing::info!("Engine spawned and initialized");
        Ok(engine)
    }

    async fn send(&mut self, command: &str) -> Result<(), EngineError> {
        tracing::trace!(label = %self.label, "UCI >> {}", command);
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn set_option(&mut self, name: &str, value: Option<&str>) -> Result<(), EngineError> {
        let cmd = match value {
            Some(val) => format!("setoption name {} value {}", name, val),
            None => format!("setoption name {}", name),
        };
        self.send(&cmd).await
    }

    /// Consume events until the next `uciok`/`readyok`.
    async fn wait_ready(&mut self, what: &'static str) -> Result<(), EngineError> {
        let waited = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            next_ready(&mut self.event_rx, &mut self.stale_searches),
        )
        .await;
        match waited {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(label = %self.label, "Timeout waiting for {}", what);
                Err(EngineError::Handshake(what))
            }
        }
    }

    /// Stop a search that overran its budget and swallow its `bestmove`,
    /// along with any still owed by earlier abandoned searches.
    async fn abort_search(&mut self) {
        // the current search counts as owed until its bestmove shows up
        self.stale_searches += 1;
        if let Err(e) = self.send("stop").await {
            tracing::warn!(label = %self.label, "Failed to send stop: {}", e);
            return;
        }
        let rx = &mut self.event_rx;
        let owed = &mut self.stale_searches;
        let settled = tokio::time::timeout(STOP_GRACE, async {
            while *owed > 0 {
                match rx.recv().await {
                    Some(EngineEvent::BestMove(_)) => *owed -= 1,
                    Some(_) => {}
                    None => return false,
                }
            }
            true
        })
        .await;
        if !matches!(settled, Ok(true)) {
            tracing::warn!(
                label = %self.label,
                stale = self.stale_searches,
                "Engine did not acknowledge stop, its late bestmove will be discarded"
            );
        }
    }
}

impl AnalysisClient for StockfishEngine {
    fn label(&self) -> &str {
        &self.label
    }

    async fn configure(&mut self, reset_state: bool) -> Result<(), EngineError> {
        if reset_state {
            tracing::debug!(label = %self.label, "Clearing engine hash");
            self.set_option("Clear Hash", None).await?;
        }
        self.send("isready").await?;
        self.wait_ready("readyok").await
    }

    async fn analyze(&mut self, board: &Board, depth: u32) -> Result<Evaluation, EngineError> {
        let fen = board.to_string();
        self.send(&format!("position fen {}", fen)).await?;
        // `go depth 0` means "no limit" to most engines
        self.send(&GoParams::depth(depth.max(1)).to_command()).await?;
        let started = Instant::now();

        let search = collect_search(&mut self.event_rx, &mut self.stale_searches);
        let (info, best) = match self.search_timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, search).await;
                match outcome {
                    Ok(result) => result?,
                    Err(_) => {
                        tracing::warn!(label = %self.label, depth, fen = %fen, "Search timed out");
                        self.abort_search().await;
                        return Err(EngineError::Timeout { depth, limit });
                    }
                }
            }
            None => search.await?,
        };

        if best.is_none() {
            return Err(EngineError::NoBestMove);
        }
        Evaluation::from_engine_info(board, &info, started.elapsed().as_secs_f64())
    }

    async fn shutdown(mut self) {
        tracing::debug!(label = %self.label, "Shutting down engine");
        let _ = self.send("quit").await;
        if tokio::time::timeout(QUIT_GRACE, self.process.wait()).await.is_err() {
            tracing::warn!(label = %self.label, "Engine ignored quit, killing it");
            let _ = self.process.kill().await;
        }
    }
}

/// Skip events up to the next `uciok`/`readyok`, settling any owed
/// `bestmove` seen on the way.
async fn next_ready(rx: &mut mpsc::Receiver<EngineEvent>, stale: &mut usize) -> Result<(), EngineError> {
    loop {
        match rx.recv().await {
            Some(EngineEvent::Ready) => return Ok(()),
            Some(EngineEvent::BestMove(_)) if *stale > 0 => *stale -= 1,
            Some(_) => continue,
            None => return Err(EngineError::Closed),
        }
    }
}

/// Collect `info` output of the principal line until `bestmove`. Output of
/// an abandoned search that is still owed a `bestmove` is dropped.
async fn collect_search(
    rx: &mut mpsc::Receiver<EngineEvent>,
    stale: &mut usize,
) -> Result<(EngineInfo, Option<Move>), EngineError> {
    let mut latest = EngineInfo::default();
    loop {
        match rx.recv().await {
            Some(EngineEvent::Info(info)) => merge_info(&mut latest, info),
            Some(EngineEvent::BestMove(_)) if *stale > 0 => {
                *stale -= 1;
                latest = EngineInfo::default();
            }
            Some(EngineEvent::BestMove(mv)) => return Ok((latest, mv)),
            Some(EngineEvent::Ready) => continue,
            None => return Err(EngineError::Closed),
        }
    }
}

/// Fold one `info` line into the running summary. Secondary lines of a
/// multi-PV search are ignored.
fn merge_info(acc: &mut EngineInfo, info: EngineInfo) {
    if info.multipv.unwrap_or(1) != 1 {
        return;
    }
    if info.score.is_some() {
        acc.score = info.score;
        acc.depth = info.depth.or(acc.depth);
        if info.wdl.is_some() {
            acc.wdl = info.wdl;
        }
        if !info.pv.is_empty() {
            acc.pv = info.pv;
        }
    }
    if info.nodes.is_some() {
        acc.nodes = info.nodes;
    }
    if info.time_ms.is_some() {
        acc.time_ms = info.time_ms;
    }
}

async fn read_engine_output(stdout: ChildStdout, event_tx: mpsc::Sender<EngineEvent>, label: String) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::debug!(label = %label, "Engine stdout EOF");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                tracing::trace!(label = %label, "UCI << {}", trimmed);

                let event = match parse_uci_message(trimmed) {
                    Ok(UciMessage::UciOk) | Ok(UciMessage::ReadyOk) => EngineEvent::Ready,
                    Ok(UciMessage::BestMove { mv, .. }) => EngineEvent::BestMove(mv),
                    Ok(UciMessage::Info(info)) => EngineEvent::Info(info),
                    Ok(UciMessage::Id { .. }) => continue,
                    Err(_) => continue,
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(label = %label, "Error reading engine stdout: {}", e);
                break;
            }
        }
    }
}

/// Find Stockfish executable in common locations
pub fn find_stockfish_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
        "stockfish", // In PATH
    ];

    for path_str in paths {
        let path = Path::new(path_str);
        if path.exists() || path_str == "stockfish" {
            // Stockfish runs command-line arguments as UCI commands and exits
            if std::process::Command::new(path_str)
                .arg("quit")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok()
            {
                return Some(PathBuf::from(path_str));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::parse_uci_move;
    use crate::Score;

    fn info_line(line: &str) -> EngineInfo {
        match parse_uci_message(line).unwrap() {
            UciMessage::Info(info) => info,
            other => panic!("not an info line: {other:?}"),
        }
    }

    #[test]
    fn merge_keeps_latest_scored_line() {
        let mut acc = EngineInfo::default();
        merge_info(&mut acc, info_line("info depth 1 score cp 20 wdl 100 800 100 nodes 20 time 1 pv e2e4"));
        merge_info(&mut acc, info_line("info depth 2 currmove d2d4 currmovenumber 2 nodes 55"));
        merge_info(&mut acc, info_line("info depth 2 score cp 31 nodes 80 time 3 pv d2d4 d7d5"));

        assert_eq!(acc.depth, Some(2));
        assert_eq!(acc.score, Some(Score::Centipawns(31)));
        assert_eq!(acc.wdl, Some((100, 800, 100)));
        assert_eq!(acc.nodes, Some(80));
        assert_eq!(acc.time_ms, Some(3));
        assert_eq!(acc.pv, vec![parse_uci_move("d2d4").unwrap(), parse_uci_move("d7d5").unwrap()]);
    }

    #[test]
    fn merge_ignores_secondary_multipv_lines() {
        let mut acc = EngineInfo::default();
        merge_info(&mut acc, info_line("info depth 5 multipv 1 score cp 10 pv e2e4"));
        merge_info(&mut acc, info_line("info depth 5 multipv 2 score cp -50 pv a2a3"));
        assert_eq!(acc.score, Some(Score::Centipawns(10)));
        assert_eq!(acc.pv.len(), 1);
    }

    #[tokio::test]
    async fn collect_search_stops_at_bestmove() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(EngineEvent::Info(info_line("info depth 3 score cp 5 pv e2e4"))).await.unwrap();
        tx.send(EngineEvent::BestMove(Some(parse_uci_move("e2e4").unwrap()))).await.unwrap();
        tx.send(EngineEvent::Info(info_line("info depth 9 score cp 99 pv d2d4"))).await.unwrap();

        let (info, best) = collect_search(&mut rx, &mut 0).await.unwrap();
        assert_eq!(info.depth, Some(3));
        assert!(best.is_some());
    }

    #[tokio::test]
    async fn collect_search_skips_late_bestmove_of_abandoned_search() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(EngineEvent::Info(info_line("info depth 30 score cp 80 pv d2d4"))).await.unwrap();
        tx.send(EngineEvent::BestMove(Some(parse_uci_move("d2d4").unwrap()))).await.unwrap();
        tx.send(EngineEvent::Info(info_line("info depth 2 score cp 12 pv e2e4"))).await.unwrap();
        tx.send(EngineEvent::BestMove(Some(parse_uci_move("e2e4").unwrap()))).await.unwrap();

        let mut stale = 1;
        let (info, best) = collect_search(&mut rx, &mut stale).await.unwrap();
        assert_eq!(stale, 0);
        assert_eq!(info.depth, Some(2));
        assert_eq!(info.score, Some(Score::Centipawns(12)));
        assert_eq!(best, Some(parse_uci_move("e2e4").unwrap()));
    }

    #[tokio::test]
    async fn next_ready_settles_owed_bestmove() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(EngineEvent::BestMove(None)).await.unwrap();
        tx.send(EngineEvent::Ready).await.unwrap();
        tx.send(EngineEvent::BestMove(None)).await.unwrap();

        let mut stale = 1;
        next_ready(&mut rx, &mut stale).await.unwrap();
        assert_eq!(stale, 0);
        // the next bestmove belongs to the next search
        let (_, best) = collect_search(&mut rx, &mut stale).await.unwrap();
        assert_eq!(best, None);
    }

    #[tokio::test]
    async fn collect_search_reports_closed_engine() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(EngineEvent::Info(info_line("info depth 3 score cp 5 pv e2e4"))).await.unwrap();
        drop(tx);
        assert!(matches!(collect_search(&mut rx, &mut 0).await, Err(EngineError::Closed)));
    }

    #[tokio::test]
    async fn spawn_fails_for_missing_executable() {
        let config = StockfishConfig {
            path: Some(PathBuf::from("/nonexistent/engine-binary")),
            ..Default::default()
        };
        assert!(matches!(
            StockfishEngine::spawn_with_config(config).await,
            Err(EngineError::Spawn(_))
        ));
    }
}
