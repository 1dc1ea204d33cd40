//! Risk records and bounded scores.

use rg_core::types::{Identity, Timestamp};
use serde::{Deserialize, Serialize};

/// Upper bound (inclusive) of every risk dimension.
pub const MAX_SCORE: u8 = 100;

/// A risk score in `[0, 100]`.
///
/// Construction is fallible, so a `RiskScore` in hand is always in range.
/// Deserialization goes through the same check.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct RiskScore(u8);

impl RiskScore {
    pub const ZERO: RiskScore = RiskScore(0);

    /// Returns `None` if `value` exceeds [`MAX_SCORE`].
    pub fn new(value: u32) -> Option<Self> {
        if value <= MAX_SCORE as u32 {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    #[inline]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RiskScore {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        RiskScore::new(value as u32)
            .ok_or_else(|| format!("risk score {} exceeds {}", value, MAX_SCORE))
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> u8 {
        score.0
    }
}

impl std::fmt::Display for RiskScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Risk data held for one token.
///
/// The all-zero record (`last_updated == 0`) is the "absent" record returned
/// for tokens that were never written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRecord {
    /// Share of supply held by the largest wallets.
    pub holder_concentration: RiskScore,
    /// How concentrated pool liquidity ownership is.
    pub liquidity_ownership: RiskScore,
    /// How easily governance can be captured.
    pub governance_capture: RiskScore,
    /// When the record was last written; zero if never.
    pub last_updated: Timestamp,
    /// The updater that wrote the record.
    pub submitter: Identity,
}

impl RiskRecord {
    /// The record returned for unknown tokens.
    pub fn absent() -> Self {
        Self::default()
    }

    /// `true` once the record has been written.
    #[inline]
    pub fn exists(&self) -> bool {
        !self.last_updated.is_zero()
    }

    /// Floor average of the three scores, or 0 when absent.
    pub fn composite_score(&self) -> u8 {
        if !self.exists() {
            return 0;
        }
        let sum = self.holder_concentration.value() as u16
            + self.liquidity_ownership.value() as u16
            + self.governance_capture.value() as u16;
        (sum / 3) as u8
    }
}
