use std::time::Duration;

use chess::{FenError, PositionKey};
use engine::{EngineError, Evaluation};
use serde::{Deserialize, Serialize};

/// One iterative-deepening step: the evaluation obtained at `depth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthRecord {
    pub depth: u32,
    #[serde(flatten)]
    pub evaluation: Evaluation,
}

/// Every depth computed for one position, shallowest first.
///
/// Stored as a plain JSON array of [`DepthRecord`]s.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    pub records: Vec<DepthRecord>,
}

impl AnalysisResult {
    pub fn new(records: Vec<DepthRecord>) -> Self {
        Self { records }
    }

    /// Depth of the last record.
    pub fn max_depth(&self) -> Option<u32> {
        self.records.last().map(|r| r.depth)
    }

    /// Whether this result already covers a request for `depth`.
    pub fn satisfies(&self, depth: u32) -> bool {
        self.max_depth().is_some_and(|d| d >= depth)
    }

    /// Depths start at `min_depth` and strictly increase.
    pub fn is_monotonic(&self, min_depth: u32) -> bool {
        match self.records.first() {
            Some(first) if first.depth == min_depth => self
                .records
                .windows(2)
                .all(|pair| pair[0].depth < pair[1].depth),
            _ => false,
        }
    }
}

/// Inclusive depth range of the iterative deepening loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRange {
    pub min: u32,
    pub target: u32,
}

impl DepthRange {
    pub fn new(min: u32, target: u32) -> Self {
        Self { min, target }
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u32> {
        self.min..=self.target
    }
}

/// Message on the work channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Analyze(PositionKey),
    /// Sentinel: the receiving worker shuts its client down and exits.
    Shutdown,
}

/// Why a single work item produced no result.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("invalid position key: {0}")]
    InvalidKey(#[from] FenError),
    #[error("engine reset failed: {0}")]
    Reset(#[source] EngineError),
    #[error("analysis at depth {depth} failed: {source}")]
    Engine {
        depth: u32,
        #[source]
        source: EngineError,
    },
    /// The client panicked mid-item. The worker survives and keeps its client.
    #[error("analysis panicked: {0}")]
    Panicked(String),
}

/// Message on the result channel.
#[derive(Debug)]
pub struct WorkerResponse {
    pub worker_id: usize,
    pub key: PositionKey,
    pub outcome: Result<AnalysisResult, ItemError>,
    /// Wall-clock time the worker spent on the item.
    pub elapsed: Duration,
}
