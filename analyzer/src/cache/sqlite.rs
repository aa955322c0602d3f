//! SQLite-backed implementation of [`ResultCache`].

use std::collections::HashMap;
use std::path::Path;

use chess::PositionKey;
use sqlx::Row;

use super::{now_timestamp, CacheError, Database, ResultCache};
use crate::pipeline::AnalysisResult;

/// SQLite result cache with an in-process write buffer.
///
/// `put` only touches the buffer; `commit` flushes the whole buffer in one
/// transaction, so a crash loses at most the writes since the last commit.
pub struct SqliteResultCache {
    db: Database,
    pending: HashMap<PositionKey, AnalysisResult>,
}

impl SqliteResultCache {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            pending: HashMap::new(),
        }
    }

    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        tracing::info!("Opening result cache at {}", path.display());
        Ok(Self::new(Database::open(path).await?))
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, CacheError> {
        Ok(Self::new(Database::new_in_memory().await?))
    }

    /// Close the pool. Uncommitted writes are discarded.
    pub async fn close(self) {
        if !self.pending.is_empty() {
            tracing::warn!(pending = self.pending.len(), "Closing cache with uncommitted writes");
        }
        self.db.close().await;
    }
}

impl ResultCache for SqliteResultCache {
    async fn get(&self, key: &PositionKey) -> Result<Option<AnalysisResult>, CacheError> {
        if let Some(result) = self.pending.get(key) {
            return Ok(Some(result.clone()));
        }

        let row = sqlx::query("SELECT records FROM analysis_cache WHERE position_key = ?")
            .bind(key.as_str())
            .fetch_optional(self.db.pool())
            .await?;

        let row = match row {
            None => return Ok(None),
            Some(r) => r,
        };
        let records: String = row.get("records");
        let result = serde_json::from_str(&records).map_err(|source| CacheError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(result))
    }

    async fn contains(&self, key: &PositionKey) -> Result<bool, CacheError> {
        if self.pending.contains_key(key) {
            return Ok(true);
        }
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM analysis_cache WHERE position_key = ?")
            .bind(key.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.is_some())
    }

    async fn put(&mut self, key: PositionKey, result: AnalysisResult) -> Result<(), CacheError> {
        self.pending.insert(key, result);
        Ok(())
    }

    async fn commit(&mut self) -> Result<usize, CacheError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let updated_at = now_timestamp() as i64;
        let mut tx = self.db.pool().begin().await?;
        for (key, result) in &self.pending {
            let records = serde_json::to_string(result)?;
            let max_depth = result.max_depth().map(i64::from).unwrap_or(-1);
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO analysis_cache (position_key, max_depth, records, updated_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(key.as_str())
            .bind(max_depth)
            .bind(&records)
            .bind(updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        let written = self.pending.len();
        self.pending.clear();
        tracing::debug!(written, "Cache commit complete");
        Ok(written)
    }

    fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    async fn committed_len(&self) -> Result<u64, CacheError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analysis_cache")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count.max(0) as u64)
    }
}
