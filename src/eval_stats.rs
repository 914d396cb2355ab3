use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct EvalStats {
    batches: AtomicU64,
    reports: AtomicU64,
    fetch_attempts: AtomicU64,
    rate_limited: AtomicU64,
    neutral_results: AtomicU64,
}

impl Default for EvalStats {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalStats {
    pub const fn new() -> Self {
        Self {
            batches: AtomicU64::new(0),
            reports: AtomicU64::new(0),
            fetch_attempts: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            neutral_results: AtomicU64::new(0),
        }
    }

    pub fn inc_batches(&self, n: u64) {
        self.batches.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_reports(&self, n: u64) {
        self.reports.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_fetch_attempts(&self, n: u64) {
        self.fetch_attempts.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self, n: u64) {
        self.rate_limited.fetch_add(n, Ordering::Relaxed);
    }

    /// Fetches that ended with the neutral zero/empty value.
    pub fn inc_neutral_results(&self, n: u64) {
        self.neutral_results.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EvalSnapshot {
        EvalSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            reports: self.reports.load(Ordering::Relaxed),
            fetch_attempts: self.fetch_attempts.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            neutral_results: self.neutral_results.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EvalSnapshot {
    pub batches: u64,
    pub reports: u64,
    pub fetch_attempts: u64,
    pub rate_limited: u64,
    pub neutral_results: u64,
}
