//! Whole-pipeline runs against mock clients and a real SQLite file.

use std::collections::HashSet;
use std::time::Duration;

use chess::PositionKey;
use cozy_chess::Board;
use engine::mock::{MockAnalysisClient, MockLog};
use tempfile::TempDir;

use super::*;
use crate::cache::{CacheError, ResultCache, SqliteResultCache};
use crate::config::{ConfigError, PipelineConfig};

/// Positions after each legal first move, in a stable order.
fn first_move_positions(n: usize) -> Vec<PositionKey> {
    let start = Board::default();
    let mut moves = Vec::new();
    start.generate_moves(|piece_moves| {
        moves.extend(piece_moves);
        false
    });
    let mut keys: Vec<PositionKey> = moves
        .into_iter()
        .map(|mv| {
            let mut board = start.clone();
            board.play_unchecked(mv);
            PositionKey::from_board(&board)
        })
        .collect();
    keys.sort();
    keys.truncate(n);
    assert_eq!(keys.len(), n, "not enough distinct positions");
    keys
}

fn mock_clients(log: &MockLog, n: usize) -> Vec<MockAnalysisClient> {
    (0..n)
        .map(|i| MockAnalysisClient::new(format!("mock-{i}"), log.clone()))
        .collect()
}

fn config(workers: usize, min_depth: u32, target_depth: u32) -> PipelineConfig {
    PipelineConfig {
        worker_count: workers,
        min_depth,
        target_depth,
        shuffle_seed: Some(1),
        shutdown_grace: Duration::from_secs(5),
        ..Default::default()
    }
}

async fn open_cache(dir: &TempDir) -> SqliteResultCache {
    SqliteResultCache::open(&dir.path().join("cache.db")).await.unwrap()
}

#[tokio::test]
async fn test_three_positions_two_workers() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(3);
    let log = MockLog::new();

    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(2, 1, 3), ShutdownTrigger::new());
    let report = coordinator
        .run(keys.iter().cloned().collect(), mock_clients(&log, 2))
        .await
        .unwrap();

    assert_eq!(
        report.phases,
        vec![Phase::Init, Phase::Dispatching, Phase::Draining, Phase::ShuttingDown, Phase::Done]
    );
    assert_eq!(report.interrupted, None);
    assert_eq!(report.stats.queued, 3);
    assert_eq!(report.stats.drained, 3);
    assert_eq!(report.stats.completed, 3);
    assert_eq!(report.stats.failed, 0);
    assert!(report.stats.commits >= 1);
    assert_eq!(report.stats.committed_writes, 3);
    assert!(report.stats.slowest_key.is_some());
    assert_eq!(report.sentinel_exits, 2);
    assert_eq!(report.joined_workers, 2);
    assert_eq!(report.aborted_workers, 0);
    assert_eq!(log.shutdowns(), 2);

    let cache = coordinator.into_cache();
    assert_eq!(cache.pending_writes(), 0);
    assert_eq!(cache.committed_len().await.unwrap(), 3);
    for key in &keys {
        let result = cache.get(key).await.unwrap().unwrap();
        let depths: Vec<u32> = result.records.iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![1, 2, 3]);
        assert!(result.is_monotonic(1));
    }
}

#[tokio::test]
async fn test_results_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(2);
    let log = MockLog::new();

    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(1, 0, 2), ShutdownTrigger::new());
    coordinator
        .run(keys.iter().cloned().collect(), mock_clients(&log, 1))
        .await
        .unwrap();
    coordinator.into_cache().close().await;

    let reopened = open_cache(&dir).await;
    for key in &keys {
        let result = reopened.get(key).await.unwrap().unwrap();
        assert!(result.is_monotonic(0));
        assert_eq!(result.max_depth(), Some(2));
        assert_eq!(
            result.records[2].evaluation,
            MockAnalysisClient::evaluation_for(&key.to_board().unwrap().to_string(), 2)
        );
    }
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let keys: HashSet<PositionKey> = first_move_positions(4).into_iter().collect();

    let first_log = MockLog::new();
    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(2, 1, 2), ShutdownTrigger::new());
    coordinator.run(keys.clone(), mock_clients(&first_log, 2)).await.unwrap();
    assert_eq!(first_log.analyzed().len(), 8);
    coordinator.into_cache().close().await;

    let second_log = MockLog::new();
    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(2, 1, 2), ShutdownTrigger::new());
    let report = coordinator.run(keys, mock_clients(&second_log, 2)).await.unwrap();

    assert!(second_log.analyzed().is_empty());
    assert_eq!(report.stats.satisfied, 4);
    assert_eq!(report.stats.queued, 0);
    assert_eq!(report.sentinel_exits, 2);
}

#[tokio::test]
async fn test_deeper_target_reanalyzes_shallow_entries() {
    let dir = tempfile::tempdir().unwrap();
    let keys: HashSet<PositionKey> = first_move_positions(2).into_iter().collect();

    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(1, 1, 1), ShutdownTrigger::new());
    coordinator.run(keys.clone(), mock_clients(&MockLog::new(), 1)).await.unwrap();

    let log = MockLog::new();
    let mut coordinator = Coordinator::new(coordinator.into_cache(), config(1, 1, 3), ShutdownTrigger::new());
    let report = coordinator.run(keys.clone(), mock_clients(&log, 1)).await.unwrap();

    assert_eq!(report.stats.queued, 2);
    assert_eq!(log.analyzed().len(), 6);
    let cache = coordinator.into_cache();
    for key in &keys {
        assert_eq!(cache.get(key).await.unwrap().unwrap().max_depth(), Some(3));
    }
}

#[tokio::test]
async fn test_each_item_is_delivered_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(20);
    let log = MockLog::new();
    let clients: Vec<_> = (0..3)
        .map(|i| {
            MockAnalysisClient::new(format!("mock-{i}"), log.clone())
                .with_delay(Duration::from_millis(i as u64 * 2))
        })
        .collect();

    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(3, 1, 1), ShutdownTrigger::new());
    let report = coordinator
        .run(keys.iter().cloned().collect(), clients)
        .await
        .unwrap();

    assert_eq!(report.stats.queued, 20);
    assert_eq!(report.stats.drained, 20);
    assert_eq!(report.stats.completed, 20);

    let mut analyzed: Vec<String> = log.analyzed().into_iter().map(|(fen, _)| fen).collect();
    analyzed.sort();
    let before = analyzed.len();
    analyzed.dedup();
    assert_eq!(before, 20);
    assert_eq!(analyzed.len(), 20);
    assert_eq!(coordinator.cache().committed_len().await.unwrap(), 20);
}

#[tokio::test]
async fn test_failed_item_is_skipped_and_retried_later() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(5);
    let broken = keys[0].clone();
    let broken_prefix = broken.as_str().to_string();

    let log = MockLog::new();
    let clients: Vec<_> = (0..2)
        .map(|i| MockAnalysisClient::new(format!("mock-{i}"), log.clone()).failing_on(broken_prefix.clone()))
        .collect();
    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(2, 1, 2), ShutdownTrigger::new());
    let report = coordinator
        .run(keys.iter().cloned().collect(), clients)
        .await
        .unwrap();

    assert_eq!(report.stats.drained, 5);
    assert_eq!(report.stats.completed, 4);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.sentinel_exits, 2);
    assert!(!coordinator.cache().contains(&broken).await.unwrap());

    let retry_log = MockLog::new();
    let mut coordinator = Coordinator::new(coordinator.into_cache(), config(2, 1, 2), ShutdownTrigger::new());
    let report = coordinator
        .run(keys.iter().cloned().collect(), mock_clients(&retry_log, 2))
        .await
        .unwrap();

    assert_eq!(report.stats.queued, 1);
    assert_eq!(report.stats.satisfied, 4);
    assert!(retry_log.analyzed().iter().all(|(fen, _)| fen.starts_with(&broken_prefix)));
    assert!(coordinator.cache().contains(&broken).await.unwrap());
}

#[tokio::test]
async fn test_panicking_client_fails_one_item_without_stalling_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(4);
    let poisoned = keys[0].clone();

    let log = MockLog::new();
    let clients: Vec<_> = (0..2)
        .map(|i| MockAnalysisClient::new(format!("mock-{i}"), log.clone()).panicking_on(poisoned.as_str()))
        .collect();
    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(2, 1, 2), ShutdownTrigger::new());
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.run(keys.iter().cloned().collect(), clients),
    )
    .await
    .expect("run stalled after a client panic")
    .unwrap();

    assert_eq!(report.stats.drained, 4);
    assert_eq!(report.stats.completed, 3);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.sentinel_exits, 2);
    assert_eq!(report.joined_workers, 2);
    assert_eq!(log.shutdowns(), 2);
    assert!(!coordinator.cache().contains(&poisoned).await.unwrap());
    assert_eq!(coordinator.cache().committed_len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_write_threshold_bounds_uncommitted_writes() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(10);
    let config = PipelineConfig {
        flush_every: 3,
        ..config(1, 1, 1)
    };

    let mut coordinator = Coordinator::new(open_cache(&dir).await, config, ShutdownTrigger::new());
    let report = coordinator
        .run(keys.into_iter().collect(), mock_clients(&MockLog::new(), 1))
        .await
        .unwrap();

    assert_eq!(report.stats.max_uncommitted_writes, 3);
    // three threshold commits and the final one
    assert_eq!(report.stats.commits, 4);
    assert_eq!(report.stats.committed_writes, 10);
}

#[tokio::test]
async fn test_interval_triggers_commits() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(3);
    let config = PipelineConfig {
        flush_every: 1_000,
        flush_interval: Duration::from_millis(100),
        ..config(1, 1, 1)
    };
    let client = MockAnalysisClient::new("slow", MockLog::new()).with_delay(Duration::from_millis(150));

    let mut coordinator = Coordinator::new(open_cache(&dir).await, config, ShutdownTrigger::new());
    let report = coordinator
        .run(keys.into_iter().collect(), vec![client])
        .await
        .unwrap();

    assert!(report.stats.commits >= 2, "commits: {}", report.stats.commits);
    assert_eq!(report.stats.committed_writes, 3);
}

#[tokio::test]
async fn test_signal_flushes_drained_results_and_joins_workers() {
    let dir = tempfile::tempdir().unwrap();
    let keys = first_move_positions(6);
    let log = MockLog::new();
    let clients = vec![
        MockAnalysisClient::new("healthy", log.clone()).with_delay(Duration::from_millis(20)),
        MockAnalysisClient::new("stuck", log.clone()).hanging(),
    ];

    let trigger = ShutdownTrigger::new();
    let signaller = {
        let trigger = trigger.clone();
        let log = log.clone();
        tokio::spawn(async move {
            while log.analyzed().len() < 6 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger(ShutdownSignal::Terminate);
        })
    };

    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(2, 1, 1), trigger);
    let report = coordinator
        .run(keys.into_iter().collect(), clients)
        .await
        .unwrap();
    signaller.await.unwrap();

    assert_eq!(report.interrupted, Some(ShutdownSignal::Terminate));
    assert_eq!(report.interrupted.map(|s| s.exit_code()), Some(143));
    assert_eq!(
        report.phases,
        vec![Phase::Init, Phase::Dispatching, Phase::Draining, Phase::ShuttingDown, Phase::Done]
    );
    assert_eq!(report.stats.queued, 6);
    assert_eq!(report.stats.completed, 5);
    assert_eq!(report.joined_workers, 2);
    assert_eq!(report.aborted_workers, 0);
    assert!(report.stats.commits >= 2);
    assert_eq!(log.shutdowns(), 2);

    let cache = coordinator.into_cache();
    assert_eq!(cache.pending_writes(), 0);
    assert_eq!(cache.committed_len().await.unwrap(), 5);
}

#[tokio::test]
async fn test_signal_before_run_skips_draining() {
    let dir = tempfile::tempdir().unwrap();
    let log = MockLog::new();
    let trigger = ShutdownTrigger::new();
    trigger.trigger(ShutdownSignal::Interrupt);

    let clients = vec![MockAnalysisClient::new("stuck", log.clone()).hanging()];
    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(1, 1, 1), trigger);
    let report = coordinator
        .run(first_move_positions(3).into_iter().collect(), clients)
        .await
        .unwrap();

    assert_eq!(report.interrupted, Some(ShutdownSignal::Interrupt));
    assert_eq!(report.stats.drained, 0);
    assert_eq!(report.joined_workers, 1);
    assert_eq!(log.shutdowns(), 1);
}

#[tokio::test]
async fn test_empty_input_completes_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let log = MockLog::new();
    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(2, 1, 3), ShutdownTrigger::new());
    let report = coordinator.run(HashSet::new(), mock_clients(&log, 2)).await.unwrap();

    assert_eq!(report.stats.queued, 0);
    assert_eq!(report.stats.commits, 1);
    assert_eq!(report.sentinel_exits, 2);
    assert!(log.analyzed().is_empty());
}

#[tokio::test]
async fn test_client_count_must_match_worker_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut coordinator = Coordinator::new(open_cache(&dir).await, config(3, 1, 1), ShutdownTrigger::new());
    let err = coordinator
        .run(HashSet::new(), mock_clients(&MockLog::new(), 2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Config(ConfigError::ClientCount { expected: 3, actual: 2 })
    ));
    assert_eq!(coordinator.phase(), None);
}

/// Accepts writes but can never commit them.
struct BrokenCache {
    pending: usize,
}

impl ResultCache for BrokenCache {
    async fn get(&self, _key: &PositionKey) -> Result<Option<AnalysisResult>, CacheError> {
        Ok(None)
    }

    async fn contains(&self, _key: &PositionKey) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn put(&mut self, _key: PositionKey, _result: AnalysisResult) -> Result<(), CacheError> {
        self.pending += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<usize, CacheError> {
        Err(CacheError::Migration("disk is gone".to_string()))
    }

    fn pending_writes(&self) -> usize {
        self.pending
    }

    async fn committed_len(&self) -> Result<u64, CacheError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_commit_failure_stops_the_run() {
    let log = MockLog::new();
    let config = PipelineConfig {
        flush_every: 1,
        ..config(2, 1, 1)
    };
    let mut coordinator = Coordinator::new(BrokenCache { pending: 0 }, config, ShutdownTrigger::new());
    let err = coordinator
        .run(first_move_positions(4).into_iter().collect(), mock_clients(&log, 2))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cache(_)));
    assert_eq!(coordinator.phase(), Some(Phase::Done));
    assert_eq!(log.shutdowns(), 2);
}
