//! Lifecycle counters.
//!
//! Four monotonically increasing counters track every session outcome.
//! Once the server is drained, `dispatched == completed + abortions +
//! rejections` holds.

use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide session counters. Updated atomically from every connection.
#[derive(Debug, Default)]
pub struct Stats {
    dispatched: AtomicU64,
    completed: AtomicU64,
    abortions: AtomicU64,
    rejections: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub dispatched: u64,
    pub completed: u64,
    pub abortions: u64,
    pub rejections: u64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub(crate) fn incr_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_abortions(&self) {
        self.abortions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_rejections(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            abortions: self.abortions.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new();
        stats.incr_dispatched();
        stats.incr_dispatched();
        stats.incr_completed();
        stats.incr_rejections();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.dispatched, 2);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.abortions, 0);
        assert_eq!(snapshot.rejections, 1);
    }
}
