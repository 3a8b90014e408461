//! Pipeline counters

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Running totals shared by the classifier and both lane workers
#[derive(Debug, Default)]
pub struct PipelineStats {
    classified: AtomicUsize,
    persisted: AtomicUsize,
    republished: AtomicUsize,
    dropped: AtomicUsize,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub classified: usize,
    pub persisted: usize,
    pub republished: usize,
    pub dropped: usize,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_classified(&self) {
        self.classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_republished(&self) {
        self.republished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            classified: self.classified.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            republished: self.republished.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "classified={} persisted={} republished={} dropped={}",
            self.classified, self.persisted, self.republished, self.dropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_recorded_counts() {
        let stats = PipelineStats::new();
        stats.record_classified();
        stats.record_classified();
        stats.record_persisted();
        stats.record_dropped();

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                classified: 2,
                persisted: 1,
                republished: 0,
                dropped: 1,
            }
        );
        assert_eq!(
            snapshot.to_string(),
            "classified=2 persisted=1 republished=0 dropped=1"
        );
    }
}
