//! Bus statistics (spec §4.4, §5): relaxed atomics, a best-effort-consistent
//! snapshot. Supplemented with per-topic-pattern counters (SPEC_FULL §2),
//! since querying stats scoped to one subscription is a common need the
//! global counters alone don't serve.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// A point-in-time snapshot of the bus's global counters. Counters are
/// relaxed atomics read independently, so a snapshot may be momentarily
/// inconsistent across fields but never observes a torn individual value.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BusStatsSnapshot {
    pub published: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub filtered: u64,
    pub queue_size: usize,
}

#[derive(Debug, Default)]
pub struct BusStatistics {
    published: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
    filtered: AtomicU64,
    per_pattern: DashMap<String, PatternCounters>,
}

#[derive(Debug, Default)]
struct PatternCounters {
    dispatched: AtomicU64,
    filtered: AtomicU64,
    failed: AtomicU64,
}

impl BusStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, pattern: &str) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.per_pattern
            .entry(pattern.to_string())
            .or_default()
            .dispatched
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self, pattern: &str) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
        self.per_pattern
            .entry(pattern.to_string())
            .or_default()
            .filtered
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, pattern: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.per_pattern
            .entry(pattern.to_string())
            .or_default()
            .failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_size: usize) -> BusStatsSnapshot {
        BusStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            queue_size,
        }
    }

    /// Per-topic-pattern `(dispatched, filtered, failed)`, for subscribers
    /// that need stats scoped to the pattern they subscribed on.
    pub fn pattern_snapshot(&self, pattern: &str) -> (u64, u64, u64) {
        match self.per_pattern.get(pattern) {
            Some(c) => (
                c.dispatched.load(Ordering::Relaxed),
                c.filtered.load(Ordering::Relaxed),
                c.failed.load(Ordering::Relaxed),
            ),
            None => (0, 0, 0),
        }
    }
}
