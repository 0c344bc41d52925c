use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Usage counters of the hub. Purely informational.
#[derive(Debug, Default)]
pub struct HubStats {
    verifications_succeeded: AtomicU64,
    verifications_failed: AtomicU64,
    publishes_succeeded: AtomicU64,
    publishes_failed: AtomicU64,
    deliveries_succeeded: AtomicU64,
    deliveries_failed: AtomicU64,
}

/// Point-in-time copy of [`HubStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub verifications_succeeded: u64,
    pub verifications_failed: u64,
    pub publishes_succeeded: u64,
    pub publishes_failed: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
}

impl HubStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_verification(&self, ok: bool) {
        let counter = if ok {
            &self.verifications_succeeded
        } else {
            &self.verifications_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self, ok: bool) {
        let counter = if ok {
            &self.publishes_succeeded
        } else {
            &self.publishes_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, ok: bool) {
        let counter = if ok {
            &self.deliveries_succeeded
        } else {
            &self.deliveries_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            verifications_succeeded: self.verifications_succeeded.load(Ordering::Relaxed),
            verifications_failed: self.verifications_failed.load(Ordering::Relaxed),
            publishes_succeeded: self.publishes_succeeded.load(Ordering::Relaxed),
            publishes_failed: self.publishes_failed.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = HubStats::new();
        stats.record_verification(true);
        stats.record_verification(false);
        stats.record_delivery(true);
        stats.record_delivery(true);
        stats.record_publish(false);

        let snap = stats.snapshot();
        assert_eq!(snap.verifications_succeeded, 1);
        assert_eq!(snap.verifications_failed, 1);
        assert_eq!(snap.deliveries_succeeded, 2);
        assert_eq!(snap.publishes_failed, 1);
        assert_eq!(snap.publishes_succeeded, 0);
    }
}
