//! Time source seam.
//!
//! Components never read the wall clock directly. They hold an
//! `Arc<dyn Clock>` so the service runs on [`SystemClock`] while tests drive
//! a [`ManualClock`] forward to exercise expiry and data-age logic.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Timestamp;

/// Source of the current ledger time.
pub trait Clock: Send + Sync {
    /// Current time. Must never return [`Timestamp::ZERO`].
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start` seconds (clamped to at least 1).
    pub fn new(start: u64) -> Self {
        Self {
            secs: AtomicU64::new(start.max(1)),
        }
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time. Values below 1 are clamped.
    pub fn set(&self, secs: u64) {
        self.secs.store(secs.max(1), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.secs.load(Ordering::SeqCst))
    }
}
