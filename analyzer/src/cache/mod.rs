//! Persistent result cache.
//!
//! The cache maps a [`PositionKey`] to the full depth-indexed
//! [`AnalysisResult`] computed for it. Writes are buffered: `put` makes a
//! result visible to later `get`/`contains` calls in the same process, but it
//! only survives a crash once `commit` has returned.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the coordinator future stays `Send`.

mod checkpoint;
mod database;
mod sqlite;

pub use checkpoint::{CheckpointPolicy, CheckpointTracker};
pub use database::Database;
pub use sqlite::SqliteResultCache;

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use chess::PositionKey;

use crate::pipeline::AnalysisResult;

/// Errors from the cache layer. Any of them ends the run.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Corrupt cache entry for {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key/value store of analysis results, owned by a single coordinator.
pub trait ResultCache: Send {
    fn get(
        &self,
        key: &PositionKey,
    ) -> impl Future<Output = Result<Option<AnalysisResult>, CacheError>> + Send;

    fn contains(&self, key: &PositionKey) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Upsert; the last write for a key wins.
    fn put(
        &mut self,
        key: PositionKey,
        result: AnalysisResult,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Durably persist every write since the previous commit. Returns the
    /// number of entries written.
    fn commit(&mut self) -> impl Future<Output = Result<usize, CacheError>> + Send;

    /// Writes buffered since the last commit.
    fn pending_writes(&self) -> usize;

    /// Number of durably stored entries.
    fn committed_len(&self) -> impl Future<Output = Result<u64, CacheError>> + Send;
}

/// Get the current unix timestamp in seconds.
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
