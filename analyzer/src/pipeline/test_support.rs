//! Fixtures shared by the pipeline and cache tests.

use engine::Evaluation;

use super::{AnalysisResult, DepthRecord};

pub fn record(depth: u32) -> DepthRecord {
    DepthRecord {
        depth,
        evaluation: Evaluation {
            score_cp: Some(20 + depth as i32),
            mate: None,
            expectation: Some(0.55),
            best_move: "e4".to_string(),
            pv: vec!["e4".to_string(), "e5".to_string()],
            elapsed_secs: 0.01,
            nodes: 1_000,
        },
    }
}

pub fn result_for_depths(depths: std::ops::RangeInclusive<u32>) -> AnalysisResult {
    AnalysisResult::new(depths.map(record).collect())
}
