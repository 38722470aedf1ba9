//! Counters for refresh cycle monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Sync orchestrator metrics.
pub struct SyncMetrics {
    /// Cycles that got past the re-entrancy gate.
    pub cycles_started: AtomicU64,
    /// Background cycles that found rates fresh.
    pub cycles_fresh: AtomicU64,
    /// Cycles that persisted a new batch.
    pub cycles_refreshed: AtomicU64,
    /// Cycles that ended in an error.
    pub cycles_failed: AtomicU64,
    /// Background cycles skipped because the host is offline.
    pub skipped_offline: AtomicU64,
    /// Background checks skipped because a cycle was already running.
    pub skipped_busy: AtomicU64,
    /// Manual refreshes answered by an in-flight cycle.
    pub joined_in_flight: AtomicU64,
    /// Failed provider attempts.
    pub provider_failures: AtomicU64,
    /// Refreshes served by a provider other than the first.
    pub fallbacks_used: AtomicU64,
    /// Records written by refresh cycles.
    pub rates_persisted: AtomicU64,
}

impl SyncMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_fresh: AtomicU64::new(0),
            cycles_refreshed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            skipped_offline: AtomicU64::new(0),
            skipped_busy: AtomicU64::new(0),
            joined_in_flight: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
            fallbacks_used: AtomicU64::new(0),
            rates_persisted: AtomicU64::new(0),
        }
    }

    pub fn cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycle_fresh(&self) {
        self.cycles_fresh.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persisted batch.
    pub fn cycle_refreshed(&self, persisted: usize, used_fallback: bool) {
        self.cycles_refreshed.fetch_add(1, Ordering::Relaxed);
        self.rates_persisted
            .fetch_add(persisted as u64, Ordering::Relaxed);
        if used_fallback {
            self.fallbacks_used.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped_offline(&self) {
        self.skipped_offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped_busy(&self) {
        self.skipped_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn joined_in_flight(&self) {
        self.joined_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn provider_failed(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_fresh: self.cycles_fresh.load(Ordering::Relaxed),
            cycles_refreshed: self.cycles_refreshed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            skipped_offline: self.skipped_offline.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
            joined_in_flight: self.joined_in_flight.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            fallbacks_used: self.fallbacks_used.load(Ordering::Relaxed),
            rates_persisted: self.rates_persisted.load(Ordering::Relaxed),
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncMetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_fresh: u64,
    pub cycles_refreshed: u64,
    pub cycles_failed: u64,
    pub skipped_offline: u64,
    pub skipped_busy: u64,
    pub joined_in_flight: u64,
    pub provider_failures: u64,
    pub fallbacks_used: u64,
    pub rates_persisted: u64,
}

/// Shared metrics instance.
pub type SharedSyncMetrics = Arc<SyncMetrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = SyncMetrics::new();

        metrics.cycle_started();
        metrics.cycle_started();
        metrics.cycle_refreshed(3, false);
        metrics.cycle_refreshed(2, true);
        metrics.cycle_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles_started, 2);
        assert_eq!(snapshot.cycles_refreshed, 2);
        assert_eq!(snapshot.rates_persisted, 5);
        assert_eq!(snapshot.fallbacks_used, 1);
        assert_eq!(snapshot.cycles_failed, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(SyncMetricsSnapshot::default()).unwrap();
        assert_eq!(json["cycles_started"], 0);
    }
}
