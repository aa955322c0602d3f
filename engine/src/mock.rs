//! Scriptable in-process analysis client for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cozy_chess::Board;

use crate::{AnalysisClient, EngineError, Evaluation};

/// One call observed by a [`MockAnalysisClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Configure { client: String, reset: bool },
    Analyze { client: String, fen: String, depth: u32 },
    Shutdown { client: String },
}

/// Call log shared by every mock created from it.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<Vec<MockCall>>>);

impl MockLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: MockCall) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// `(fen, depth)` of every analyze call, in call order.
    pub fn analyzed(&self) -> Vec<(String, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Analyze { fen, depth, .. } => Some((fen, depth)),
                _ => None,
            })
            .collect()
    }

    pub fn shutdowns(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::Shutdown { .. }))
            .count()
    }
}

pub struct MockAnalysisClient {
    label: String,
    log: MockLog,
    fail_prefixes: Vec<String>,
    panic_prefixes: Vec<String>,
    delay: Option<Duration>,
    hang: bool,
}

impl MockAnalysisClient {
    pub fn new(label: impl Into<String>, log: MockLog) -> Self {
        Self {
            label: label.into(),
            log,
            fail_prefixes: Vec::new(),
            panic_prefixes: Vec::new(),
            delay: None,
            hang: false,
        }
    }

    /// Fail every analysis of a position whose FEN starts with `prefix`.
    pub fn failing_on(mut self, prefix: impl Into<String>) -> Self {
        self.fail_prefixes.push(prefix.into());
        self
    }

    /// Panic while analyzing a position whose FEN starts with `prefix`.
    pub fn panicking_on(mut self, prefix: impl Into<String>) -> Self {
        self.panic_prefixes.push(prefix.into());
        self
    }

    /// Sleep before answering each analysis.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Never answer an analysis request.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// The record every successful call returns, a function of the inputs.
    pub fn evaluation_for(fen: &str, depth: u32) -> Evaluation {
        let score = fen.bytes().map(u32::from).sum::<u32>() % 200;
        Evaluation {
            score_cp: Some(score as i32 - 100 + depth as i32),
            mate: None,
            expectation: Some(0.5),
            best_move: "Kf1".to_string(),
            pv: vec!["Kf1".to_string()],
            elapsed_secs: 0.001,
            nodes: u64::from(depth) * 100,
        }
    }
}

impl AnalysisClient for MockAnalysisClient {
    fn label(&self) -> &str {
        &self.label
    }

    async fn configure(&mut self, reset_state: bool) -> Result<(), EngineError> {
        self.log.push(MockCall::Configure {
            client: self.label.clone(),
            reset: reset_state,
        });
        Ok(())
    }

    async fn analyze(&mut self, board: &Board, depth: u32) -> Result<Evaluation, EngineError> {
        let fen = board.to_string();
        self.log.push(MockCall::Analyze {
            client: self.label.clone(),
            fen: fen.clone(),
            depth,
        });
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_prefixes.iter().any(|p| fen.starts_with(p.as_str())) {
            panic!("scripted panic on {fen}");
        }
        if self.fail_prefixes.iter().any(|p| fen.starts_with(p.as_str())) {
            return Err(EngineError::NoBestMove);
        }
        Ok(Self::evaluation_for(&fen, depth))
    }

    async fn shutdown(self) {
        self.log.push(MockCall::Shutdown {
            client: self.label.clone(),
        });
    }
}
