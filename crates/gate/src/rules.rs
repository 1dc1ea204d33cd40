//! Reason derivation.
//!
//! A token's risk record is explained by a [`ReasonChain`]: an ordered list
//! of [`ReasonRule`]s where the first rule that matches names the reason and
//! the score that drives the gate. The default chain checks each dimension
//! against the high threshold (scoring the token by that dimension), then
//! the composite against the medium threshold, then falls back to
//! [`RiskReason::LowRisk`] scored by the composite.

use std::fmt;

use rg_registry::RiskRecord;
use serde::{Deserialize, Serialize};

use crate::gate::Thresholds;

/// Why a token scored the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    NoData,
    HighHolderConcentration,
    HighLiquidityOwnership,
    HighGovernanceCapture,
    MultipleModerateFactors,
    LowRisk,
}

impl RiskReason {
    /// Human-readable explanation shown to the swapper.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoData => "No risk data available",
            Self::HighHolderConcentration => "High holder concentration risk",
            Self::HighLiquidityOwnership => "High liquidity ownership risk",
            Self::HighGovernanceCapture => "High governance capture risk",
            Self::MultipleModerateFactors => "Multiple moderate risk factors",
            Self::LowRisk => "Low risk profile",
        }
    }
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A matched reason and the score it assigns the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub reason: RiskReason,
    pub score: u8,
}

impl Finding {
    pub fn new(reason: RiskReason, score: u8) -> Self {
        Self { reason, score }
    }
}

/// One step of reason derivation.
pub trait ReasonRule: Send + Sync {
    /// Name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Return a finding if this rule explains the record.
    fn evaluate(&self, record: &RiskRecord, thresholds: &Thresholds) -> Option<Finding>;
}

/// Matches when holder concentration is at or above the high threshold.
pub struct HighHolderConcentration;

impl ReasonRule for HighHolderConcentration {
    fn name(&self) -> &str {
        "high_holder_concentration"
    }

    fn evaluate(&self, record: &RiskRecord, thresholds: &Thresholds) -> Option<Finding> {
        let score = record.holder_concentration.value();
        (score >= thresholds.high())
            .then_some(Finding::new(RiskReason::HighHolderConcentration, score))
    }
}

/// Matches when liquidity ownership is at or above the high threshold.
pub struct HighLiquidityOwnership;

impl ReasonRule for HighLiquidityOwnership {
    fn name(&self) -> &str {
        "high_liquidity_ownership"
    }

    fn evaluate(&self, record: &RiskRecord, thresholds: &Thresholds) -> Option<Finding> {
        let score = record.liquidity_ownership.value();
        (score >= thresholds.high())
            .then_some(Finding::new(RiskReason::HighLiquidityOwnership, score))
    }
}

/// Matches when governance capture is at or above the high threshold.
pub struct HighGovernanceCapture;

impl ReasonRule for HighGovernanceCapture {
    fn name(&self) -> &str {
        "high_governance_capture"
    }

    fn evaluate(&self, record: &RiskRecord, thresholds: &Thresholds) -> Option<Finding> {
        let score = record.governance_capture.value();
        (score >= thresholds.high())
            .then_some(Finding::new(RiskReason::HighGovernanceCapture, score))
    }
}

/// Matches when the composite is at or above the medium threshold.
pub struct ModerateComposite;

impl ReasonRule for ModerateComposite {
    fn name(&self) -> &str {
        "moderate_composite"
    }

    fn evaluate(&self, record: &RiskRecord, thresholds: &Thresholds) -> Option<Finding> {
        let composite = record.composite_score();
        (composite >= thresholds.medium())
            .then_some(Finding::new(RiskReason::MultipleModerateFactors, composite))
    }
}

/// Ordered rule list; first match wins.
pub struct ReasonChain {
    rules: Vec<Box<dyn ReasonRule>>,
}

impl ReasonChain {
    /// An empty chain. Every existing record explains as [`RiskReason::LowRisk`].
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule to the end of the chain.
    pub fn add_rule(&mut self, rule: impl ReasonRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Explain `record`.
    ///
    /// Absent records short-circuit to [`RiskReason::NoData`] with score 0
    /// before any rule runs.
    pub fn explain(&self, record: &RiskRecord, thresholds: &Thresholds) -> Finding {
        if !record.exists() {
            return Finding::new(RiskReason::NoData, 0);
        }
        for rule in &self.rules {
            if let Some(finding) = rule.evaluate(record, thresholds) {
                tracing::trace!(
                    rule = rule.name(),
                    reason = %finding.reason,
                    score = finding.score,
                    "reason rule matched"
                );
                return finding;
            }
        }
        Finding::new(RiskReason::LowRisk, record.composite_score())
    }

    /// Number of rules, not counting the no-data and low-risk fallbacks.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for ReasonChain {
    /// Holder, liquidity, governance against high; composite against medium.
    fn default() -> Self {
        let mut chain = Self::new();
        chain.add_rule(HighHolderConcentration);
        chain.add_rule(HighLiquidityOwnership);
        chain.add_rule(HighGovernanceCapture);
        chain.add_rule(ModerateComposite);
        chain
    }
}
