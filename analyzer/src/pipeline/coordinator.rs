//! End-to-end run: dispatch, drain, checkpoint, shut down.
//!
//! The coordinator is the only owner of the cache. It moves through
//! `Init -> Dispatching -> Draining -> ShuttingDown -> Done`; a shutdown
//! signal jumps straight from wherever it is to `ShuttingDown`.

use std::collections::HashSet;
use std::time::Duration;

use chess::PositionKey;
use engine::AnalysisClient;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::dispatch::plan_work;
use super::progress::ProgressReporter;
use super::signal::{ShutdownSignal, ShutdownTrigger};
use super::worker::{PoolClosed, WorkerPool};
use super::WorkerResponse;
use crate::cache::{CacheError, CheckpointTracker, ResultCache};
use crate::config::{ConfigError, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Dispatching,
    Draining,
    ShuttingDown,
    Done,
}

/// Counters owned by the coordinator for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Unique positions handed to the run.
    pub input_positions: usize,
    pub satisfied: usize,
    pub queued: usize,
    pub drained: usize,
    pub completed: usize,
    pub failed: usize,
    pub commits: usize,
    pub committed_writes: usize,
    /// Highest number of uncommitted writes observed between two commits.
    pub max_uncommitted_writes: usize,
    /// Longest time a worker spent on one item.
    pub slowest_item: Duration,
    pub slowest_key: Option<PositionKey>,
}

impl RunStats {
    fn record_latency(&mut self, key: &PositionKey, elapsed: Duration) {
        if elapsed >= self.slowest_item {
            self.slowest_item = elapsed;
            self.slowest_key = Some(key.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    /// The signal that cut the run short, if any.
    pub interrupted: Option<ShutdownSignal>,
    /// Phases in the order they were entered.
    pub phases: Vec<Phase>,
    /// Workers that stopped because they received a sentinel.
    pub sentinel_exits: usize,
    pub joined_workers: usize,
    pub aborted_workers: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cache failure: {0}")]
    Cache(#[from] CacheError),
    #[error("could not queue work: {0}")]
    PoolClosed(#[from] PoolClosed),
    #[error("all workers exited after {drained} of {expected} responses")]
    WorkersExited { drained: usize, expected: usize },
}

pub struct Coordinator<C: ResultCache> {
    cache: C,
    config: PipelineConfig,
    shutdown: ShutdownTrigger,
    phases: Vec<Phase>,
    stats: RunStats,
    checkpoint: CheckpointTracker,
    progress: ProgressReporter,
}

impl<C: ResultCache> Coordinator<C> {
    pub fn new(cache: C, config: PipelineConfig, shutdown: ShutdownTrigger) -> Self {
        let now = Instant::now();
        Self {
            checkpoint: CheckpointTracker::new(config.checkpoint_policy(), now),
            progress: ProgressReporter::new(config.progress_every, config.progress_interval, now),
            cache,
            config,
            shutdown,
            phases: Vec::new(),
            stats: RunStats::default(),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phases.last().copied()
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn into_cache(self) -> C {
        self.cache
    }

    /// Analyze every key in `keys` that the cache does not already cover,
    /// using one worker per client.
    pub async fn run<A: AnalysisClient>(
        &mut self,
        keys: HashSet<PositionKey>,
        clients: Vec<A>,
    ) -> Result<RunReport, PipelineError> {
        self.config.validate(clients.len())?;
        let signal = self.shutdown.token();

        self.enter(Phase::Init);
        let pool_cancel = CancellationToken::new();
        let mut pool = WorkerPool::start(clients, self.config.depth_range(), pool_cancel);
        self.checkpoint.mark_committed(Instant::now());

        self.enter(Phase::Dispatching);
        self.stats.input_positions = keys.len();
        let plan = match plan_work(
            &self.cache,
            keys,
            self.config.target_depth,
            self.config.shuffle_seed,
        )
        .await
        {
            Ok(plan) => plan,
            Err(e) => return self.abort(pool, e.into()).await,
        };
        self.stats.satisfied = plan.satisfied;
        for key in plan.needs_work {
            if let Err(e) = pool.submit(key) {
                return self.abort(pool, e.into()).await;
            }
            self.stats.queued += 1;
        }
        tracing::info!(
            queued = self.stats.queued,
            satisfied = self.stats.satisfied,
            workers = pool.size(),
            "Dispatch complete"
        );

        self.enter(Phase::Draining);
        let mut interrupted = None;
        while self.stats.drained < self.stats.queued {
            let wake_at = self.checkpoint.deadline().min(self.progress.deadline());
            tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    interrupted = Some(self.received_signal());
                    break;
                }
                response = pool.next_response() => match response {
                    Some(response) => {
                        if let Err(e) = self.handle_response(response).await {
                            return self.abort(pool, e).await;
                        }
                    }
                    None => {
                        let e = PipelineError::WorkersExited {
                            drained: self.stats.drained,
                            expected: self.stats.queued,
                        };
                        return self.abort(pool, e).await;
                    }
                },
                _ = tokio::time::sleep_until(wake_at) => {
                    if let Err(e) = self.on_tick().await {
                        return self.abort(pool, e).await;
                    }
                }
            }
        }
        if interrupted.is_none() && signal.is_cancelled() {
            interrupted = Some(self.received_signal());
        }

        match self.finish(pool, interrupted).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.enter(Phase::Done);
                Err(e)
            }
        }
    }

    async fn finish(
        &mut self,
        mut pool: WorkerPool,
        interrupted: Option<ShutdownSignal>,
    ) -> Result<RunReport, PipelineError> {
        self.enter(Phase::ShuttingDown);

        if let Some(signal) = interrupted {
            tracing::warn!(
                ?signal,
                drained = self.stats.drained,
                queued = self.stats.queued,
                "Interrupted, saving drained results"
            );
            let saved = self.save_published(&mut pool).await;
            pool.cancel();
            if let Err(e) = saved {
                pool.shutdown(self.config.shutdown_grace).await;
                return Err(e);
            }
        }

        let mut outcome = pool.shutdown(self.config.shutdown_grace).await;
        for response in std::mem::take(&mut outcome.leftover) {
            self.handle_response(response).await?;
        }
        self.commit("final").await?;
        self.progress.report(&self.stats, Instant::now());

        let sentinel_exits = outcome
            .exits
            .iter()
            .filter(|(_, exit)| *exit == super::WorkerExit::Sentinel)
            .count();
        let joined_workers = outcome.joined();

        self.enter(Phase::Done);
        tracing::info!(
            completed = self.stats.completed,
            failed = self.stats.failed,
            commits = self.stats.commits,
            interrupted = ?interrupted,
            "Run finished"
        );
        Ok(RunReport {
            stats: self.stats.clone(),
            interrupted,
            phases: self.phases.clone(),
            sentinel_exits,
            joined_workers,
            aborted_workers: outcome.aborted,
        })
    }

    /// Write and commit whatever workers published before the signal.
    async fn save_published(&mut self, pool: &mut WorkerPool) -> Result<(), PipelineError> {
        while let Some(response) = pool.try_next_response() {
            self.handle_response(response).await?;
        }
        self.commit("interrupt").await
    }

    /// Stop the pool after a fatal error. Nothing is committed: the cache is
    /// not trusted any more.
    async fn abort(&mut self, pool: WorkerPool, error: PipelineError) -> Result<RunReport, PipelineError> {
        tracing::error!("Run aborted: {}", error);
        self.enter(Phase::ShuttingDown);
        pool.cancel();
        pool.shutdown(self.config.shutdown_grace).await;
        self.enter(Phase::Done);
        Err(error)
    }

    async fn handle_response(&mut self, response: WorkerResponse) -> Result<(), PipelineError> {
        self.stats.drained += 1;
        self.stats.record_latency(&response.key, response.elapsed);

        match response.outcome {
            Ok(result) if !result.is_monotonic(self.config.min_depth) => {
                self.stats.failed += 1;
                tracing::warn!(
                    worker_id = response.worker_id,
                    key = %response.key,
                    "Discarding result with out-of-order depths"
                );
            }
            Ok(result) => {
                self.cache.put(response.key, result).await?;
                self.stats.completed += 1;
                self.checkpoint.record_write();
                self.stats.max_uncommitted_writes = self
                    .stats
                    .max_uncommitted_writes
                    .max(self.checkpoint.uncommitted());
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(
                    worker_id = response.worker_id,
                    key = %response.key,
                    "Skipping position, it will be retried on the next run: {}",
                    e
                );
            }
        }

        // failed items still have to honor the interval for earlier writes
        let now = Instant::now();
        if self.checkpoint.uncommitted() > 0 && self.checkpoint.is_due(now) {
            self.commit("threshold").await?;
        }
        self.progress.maybe_report(&self.stats, now);
        Ok(())
    }

    async fn on_tick(&mut self) -> Result<(), PipelineError> {
        let now = Instant::now();
        if self.checkpoint.is_due(now) {
            if self.checkpoint.uncommitted() > 0 {
                self.commit("interval").await?;
            } else {
                self.checkpoint.mark_committed(now);
            }
        }
        self.progress.maybe_report(&self.stats, now);
        Ok(())
    }

    async fn commit(&mut self, reason: &'static str) -> Result<(), PipelineError> {
        let written = self.cache.commit().await?;
        self.stats.commits += 1;
        self.stats.committed_writes += written;
        self.checkpoint.mark_committed(Instant::now());
        tracing::debug!(reason, written, commits = self.stats.commits, "Checkpoint committed");
        Ok(())
    }

    fn received_signal(&self) -> ShutdownSignal {
        self.shutdown.signal().unwrap_or(ShutdownSignal::Interrupt)
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase(), to = ?phase, "Coordinator phase");
        self.phases.push(phase);
    }
}
