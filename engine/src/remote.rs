//! HTTP analysis service client.
//!
//! The service answers `GET <url>?depth=<n>&fen=<fen>` with one evaluation
//! record as JSON, already in White's perspective and SAN notation.

use std::time::Duration;

use cozy_chess::Board;

use crate::{AnalysisClient, EngineError, Evaluation};

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    /// Request timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub label: Option<String>,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
            label: None,
        }
    }
}

pub struct RemoteClient {
    http: reqwest::Client,
    url: String,
    label: String,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self, EngineError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            label: config.label.unwrap_or_else(|| "remote".to_string()),
            url: config.url,
        })
    }
}

impl AnalysisClient for RemoteClient {
    fn label(&self) -> &str {
        &self.label
    }

    async fn configure(&mut self, _reset_state: bool) -> Result<(), EngineError> {
        // The service keeps no state between requests
        tracing::trace!(label = %self.label, "Nothing to configure for remote client");
        Ok(())
    }

    async fn analyze(&mut self, board: &Board, depth: u32) -> Result<Evaluation, EngineError> {
        let fen = board.to_string();
        tracing::debug!(label = %self.label, depth, fen = %fen, "Requesting remote analysis");

        let response = self
            .http
            .get(&self.url)
            .query(&[("depth", depth.to_string()), ("fen", fen)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
            });
        }

        response.json::<Evaluation>().await?.validated()
    }

    async fn shutdown(self) {
        tracing::debug!(label = %self.label, "Remote client released");
    }
}
