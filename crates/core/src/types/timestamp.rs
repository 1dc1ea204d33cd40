//! Ledger timestamps.
//!
//! [`Timestamp`] wraps a `u64` holding whole seconds since the Unix epoch,
//! the resolution a block timestamp has. `Timestamp(0)` is reserved as the
//! "never written" marker, so a live clock never returns it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The "absent" marker.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Wall-clock now, in whole seconds.
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(1) as u64)
    }

    /// Returns the raw second value.
    #[inline]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the "absent" marker.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Seconds elapsed from `earlier` to `self`, saturating at zero.
    #[inline]
    pub const fn elapsed_since(&self, earlier: &Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns `self + secs`, saturating at `u64::MAX`.
    #[inline]
    pub const fn plus_secs(&self, secs: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
