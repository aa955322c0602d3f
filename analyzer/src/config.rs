//! Configuration for the position analyzer
//!
//! Handles data directory configuration with the following precedence:
//! 1. POSITION_ANALYZER_DATA_DIR environment variable
//! 2. the platform data directory (e.g. ~/.local/share/position-analyzer)
//! 3. ./data (fallback for development)

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CheckpointPolicy;
use crate::pipeline::DepthRange;

pub const DATA_DIR_ENV: &str = "POSITION_ANALYZER_DATA_DIR";
const DEV_DATA_DIR: &str = "./data";
const CACHE_FILE: &str = "cache.db";

/// Get the data directory for the result cache.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "position-analyzer") {
        return dirs.data_dir().to_path_buf();
    }

    PathBuf::from(DEV_DATA_DIR)
}

pub fn default_cache_path() -> PathBuf {
    get_data_dir().join(CACHE_FILE)
}

/// Tunables of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deepest search requested; a cached entry at this depth is satisfied.
    pub target_depth: u32,
    /// First depth of the iterative deepening sequence.
    pub min_depth: u32,
    pub worker_count: usize,
    /// Commit after this many uncommitted writes...
    pub flush_every: usize,
    /// ...or once this much time has passed since the last commit.
    pub flush_interval: Duration,
    pub progress_every: usize,
    pub progress_interval: Duration,
    /// How long to wait for workers to exit before aborting them.
    pub shutdown_grace: Duration,
    /// Fixed seed for the work order; random when `None`.
    pub shuffle_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_depth: 1,
            min_depth: 1,
            worker_count: 4,
            flush_every: 10,
            flush_interval: Duration::from_secs(60),
            progress_every: 10,
            progress_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("minimum depth {min} exceeds target depth {target}")]
    DepthRange { min: u32, target: u32 },
    #[error("checkpoint write threshold must be at least 1")]
    ZeroFlushThreshold,
    #[error("expected {expected} analysis clients, got {actual}")]
    ClientCount { expected: usize, actual: usize },
}

impl PipelineConfig {
    pub fn validate(&self, client_count: usize) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.min_depth > self.target_depth {
            return Err(ConfigError::DepthRange {
                min: self.min_depth,
                target: self.target_depth,
            });
        }
        if self.flush_every == 0 {
            return Err(ConfigError::ZeroFlushThreshold);
        }
        if client_count != self.worker_count {
            return Err(ConfigError::ClientCount {
                expected: self.worker_count,
                actual: client_count,
            });
        }
        Ok(())
    }

    pub fn depth_range(&self) -> DepthRange {
        DepthRange::new(self.min_depth, self.target_depth)
    }

    pub fn checkpoint_policy(&self) -> CheckpointPolicy {
        CheckpointPolicy {
            max_writes: self.flush_every,
            max_interval: self.flush_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_dir_is_not_empty() {
        // Depends on the environment; only the shape is checked
        let dir = get_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_default_cache_path_file_name() {
        assert!(default_cache_path().ends_with(CACHE_FILE));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.validate(4), Ok(()));
        assert_eq!(config.flush_every, 10);
        assert_eq!(config.flush_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_validation_errors() {
        let config = PipelineConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(0), Err(ConfigError::NoWorkers));

        let config = PipelineConfig {
            min_depth: 5,
            target_depth: 3,
            ..Default::default()
        };
        assert_eq!(
            config.validate(4),
            Err(ConfigError::DepthRange { min: 5, target: 3 })
        );

        let config = PipelineConfig {
            flush_every: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(4), Err(ConfigError::ZeroFlushThreshold));

        assert_eq!(
            PipelineConfig::default().validate(2),
            Err(ConfigError::ClientCount {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_depth_range_from_config() {
        let config = PipelineConfig {
            min_depth: 0,
            target_depth: 3,
            ..Default::default()
        };
        assert_eq!(config.depth_range().iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }
}
