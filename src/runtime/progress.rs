use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_PROGRESS_EVERY: u64 = 2000;

/// Counts accepted records for one ecosystem and decides when a progress
/// line is due.
#[derive(Debug)]
pub struct SyncProgress {
    every: u64,
    expected: u64,
    accepted: AtomicU64,
    upserted: AtomicU64,
}

impl SyncProgress {
    /// `expected = 0` means the upstream total is unknown.
    pub fn new(every: u64, expected: u64) -> Self {
        Self {
            every: every.max(1),
            expected,
            accepted: AtomicU64::new(0),
            upserted: AtomicU64::new(0),
        }
    }

    /// Counts one accepted record and returns `true` when a report is due.
    /// Nothing is ever due while the expected total is unknown.
    pub fn record_accepted(&self) -> bool {
        let accepted = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
        self.expected > 0 && accepted % self.every == 0
    }

    pub fn record_upserted(&self, rows: usize) {
        self.upserted.fetch_add(rows as u64, Ordering::SeqCst);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn upserted(&self) -> u64 {
        self.upserted.load(Ordering::SeqCst)
    }

    pub fn expected(&self) -> Option<u64> {
        (self.expected > 0).then_some(self.expected)
    }

    /// Whether this run alone has reached the expected total.
    pub fn reached_expected(&self) -> bool {
        self.expected > 0 && self.accepted() >= self.expected
    }

    pub fn report(&self, ecosystem: &str, stored: u64, pending: usize) {
        tracing::info!(
            ecosystem,
            progress = format!("{}/{}", stored + pending as u64, self.expected),
            accepted = self.accepted(),
            "message sync progress"
        );
    }
}
