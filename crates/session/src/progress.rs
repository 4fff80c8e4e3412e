use std::sync::atomic::{AtomicU64, Ordering};

/// Byte-level progress of a single transfer.
///
/// Written by the session performing the upload, read by whoever is
/// displaying it. Shared via `Arc`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct Progress {
    transferred: AtomicU64,
    total: AtomicU64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Records `bytes` more bytes as sent.
    pub fn advance(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Completion in `0.0..=1.0`; `0.0` while the total is unknown.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => (self.transferred() as f64 / total as f64).clamp(0.0, 1.0),
        }
    }
}
