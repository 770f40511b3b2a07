use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome counters for registration jobs. Every increment is mirrored to
/// the `metrics` facade so an installed recorder can export them.
#[derive(Debug, Default)]
pub struct RegistrarStats {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    deduplicated: AtomicU64,
    unmatched: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub dispatched: u64,
    pub deduplicated: u64,
    pub unmatched: u64,
    pub failed: u64,
}

impl StatsSnapshot {
    /// Jobs that have run to an outcome.
    pub fn completed(&self) -> u64 {
        self.dispatched + self.deduplicated + self.unmatched + self.failed
    }
}

impl RegistrarStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("uaa_registrations_submitted").increment(1);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("uaa_registrations_dispatched").increment(1);
    }

    pub fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("uaa_registrations_deduplicated").increment(1);
    }

    pub fn record_unmatched(&self) {
        self.unmatched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("uaa_registrations_unmatched").increment(1);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("uaa_registrations_failed").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
