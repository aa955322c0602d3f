//! Hybrid count/time commit policy.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    /// Commit once this many writes are uncommitted.
    pub max_writes: usize,
    /// Commit once this much time has passed since the last commit.
    pub max_interval: Duration,
}

/// Tracks uncommitted writes and the time of the last commit.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    policy: CheckpointPolicy,
    uncommitted: usize,
    last_commit: Instant,
}

impl CheckpointTracker {
    pub fn new(policy: CheckpointPolicy, now: Instant) -> Self {
        Self {
            policy,
            uncommitted: 0,
            last_commit: now,
        }
    }

    pub fn record_write(&mut self) {
        self.uncommitted += 1;
    }

    pub fn uncommitted(&self) -> usize {
        self.uncommitted
    }

    /// When the time threshold next expires.
    pub fn deadline(&self) -> Instant {
        self.last_commit + self.policy.max_interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.uncommitted >= self.policy.max_writes || now >= self.deadline()
    }

    pub fn mark_committed(&mut self, now: Instant) {
        self.uncommitted = 0;
        self.last_commit = now;
    }
}
