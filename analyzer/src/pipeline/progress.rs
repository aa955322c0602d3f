//! Periodic progress lines.

use std::time::Duration;

use tokio::time::Instant;

use super::RunStats;

/// Emits an info line every `every` drained responses or `interval`,
/// whichever comes first.
#[derive(Debug)]
pub struct ProgressReporter {
    every: usize,
    interval: Duration,
    last_drained: usize,
    last_report: Instant,
}

impl ProgressReporter {
    pub fn new(every: usize, interval: Duration, now: Instant) -> Self {
        Self {
            every: every.max(1),
            interval,
            last_drained: 0,
            last_report: now,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.last_report + self.interval
    }

    pub fn is_due(&self, stats: &RunStats, now: Instant) -> bool {
        stats.drained >= self.last_drained + self.every || now >= self.deadline()
    }

    /// Log if due. Returns whether a line was emitted.
    pub fn maybe_report(&mut self, stats: &RunStats, now: Instant) -> bool {
        if !self.is_due(stats, now) {
            return false;
        }
        self.report(stats, now);
        true
    }

    pub fn report(&mut self, stats: &RunStats, now: Instant) {
        tracing::info!(
            queued = stats.queued,
            satisfied = stats.satisfied,
            drained = stats.drained,
            completed = stats.completed,
            failed = stats.failed,
            commits = stats.commits,
            slowest_secs = stats.slowest_item.as_secs_f64(),
            slowest_key = stats.slowest_key.as_ref().map(|k| k.as_str()).unwrap_or("-"),
            "Progress {}/{}",
            stats.drained,
            stats.queued
        );
        self.last_drained = stats.drained;
        self.last_report = now;
    }
}
