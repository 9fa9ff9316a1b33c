//! Query-execution metrics: observational counters updated with relaxed
//! atomics, never used for synchronization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct QueryMetrics {
    pub num_cores: AtomicU64,
    pub num_chores: AtomicU64,
    pub num_leaves: AtomicU64,
    pub num_bins: AtomicU64,
    pub leaves_us: AtomicU64,
    pub composer_us: AtomicU64,
    pub project_us: AtomicU64,
    pub cancellations: AtomicU64,
    pub composer_iterations: AtomicU64,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_leaves_duration(&self, d: Duration) {
        self.leaves_us.store(d.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_composer_duration(&self, d: Duration) {
        self.composer_us.store(d.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_project_duration(&self, d: Duration) {
        self.project_us.store(d.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn note_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_composer_iterations(&self) {
        self.composer_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueryMetricsSnapshot {
        QueryMetricsSnapshot {
            num_cores: self.num_cores.load(Ordering::Relaxed),
            num_chores: self.num_chores.load(Ordering::Relaxed),
            num_leaves: self.num_leaves.load(Ordering::Relaxed),
            num_bins: self.num_bins.load(Ordering::Relaxed),
            leaves_us: self.leaves_us.load(Ordering::Relaxed),
            composer_us: self.composer_us.load(Ordering::Relaxed),
            project_us: self.project_us.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            composer_iterations: self.composer_iterations.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time, non-atomic copy of [`QueryMetrics`] suitable for logging
/// or returning to a caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryMetricsSnapshot {
    pub num_cores: u64,
    pub num_chores: u64,
    pub num_leaves: u64,
    pub num_bins: u64,
    pub leaves_us: u64,
    pub composer_us: u64,
    pub project_us: u64,
    pub cancellations: u64,
    pub composer_iterations: u64,
}
