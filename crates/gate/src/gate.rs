//! Swap admission decisions.

use std::sync::Arc;

use parking_lot::Mutex;
use rg_core::clock::Clock;
use rg_core::config::{GateConfig, GateMode};
use rg_core::types::TokenId;
use rg_registry::{RiskLookup, MAX_SCORE};
use serde::Serialize;

use crate::event::GateEvent;
use crate::rules::{Finding, ReasonChain, RiskReason};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("invalid thresholds: medium {medium} must not exceed high {high}, and high must be at most 100")]
    InvalidThresholds { high: u8, medium: u8 },
}

/// High and medium cut-offs, with `medium <= high <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    high: u8,
    medium: u8,
}

impl Thresholds {
    pub fn new(high: u8, medium: u8) -> Result<Self, GateError> {
        if high > MAX_SCORE || medium > high {
            return Err(GateError::InvalidThresholds { high, medium });
        }
        Ok(Self { high, medium })
    }

    #[inline]
    pub fn high(&self) -> u8 {
        self.high
    }

    #[inline]
    pub fn medium(&self) -> u8 {
        self.medium
    }
}

/// One token's score and explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub token: TokenId,
    /// The triggering dimension for high-risk reasons, otherwise the
    /// composite; 0 when the token has no record.
    pub score: u8,
    pub reason: RiskReason,
}

/// Outcome of [`RiskGate::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub should_block: bool,
    /// The riskier of the two tokens.
    pub token: TokenId,
    pub score: u8,
    pub reason: RiskReason,
    pub mode: GateMode,
}

/// Reads registry scores and applies the blocking policy.
pub struct RiskGate {
    lookup: Arc<dyn RiskLookup>,
    clock: Arc<dyn Clock>,
    mode: GateMode,
    thresholds: Thresholds,
    chain: ReasonChain,
    events: Mutex<Vec<GateEvent>>,
}

impl RiskGate {
    /// Create a gate with the default reason chain.
    pub fn new(
        mode: GateMode,
        thresholds: Thresholds,
        lookup: Arc<dyn RiskLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_chain(mode, thresholds, ReasonChain::default(), lookup, clock)
    }

    /// Create a gate that explains tokens with a custom reason chain.
    pub fn with_chain(
        mode: GateMode,
        thresholds: Thresholds,
        chain: ReasonChain,
        lookup: Arc<dyn RiskLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        tracing::debug!(
            ?mode,
            high = thresholds.high(),
            medium = thresholds.medium(),
            rules = chain.rule_count(),
            "risk gate configured"
        );
        Self {
            lookup,
            clock,
            mode,
            thresholds,
            chain,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Build from configuration, validating the thresholds.
    pub fn from_config(
        cfg: &GateConfig,
        lookup: Arc<dyn RiskLookup>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GateError> {
        let thresholds = Thresholds::new(cfg.high_threshold, cfg.medium_threshold)?;
        Ok(Self::new(cfg.mode, thresholds, lookup, clock))
    }

    /// Blocking policy in force.
    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Validated high and medium thresholds.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Score and explain a single token.
    pub fn assess(&self, token: TokenId) -> Assessment {
        let record = self.lookup.read(&token);
        let Finding { reason, score } = self.chain.explain(&record, &self.thresholds);
        Assessment {
            token,
            score,
            reason,
        }
    }

    /// Decide whether a swap between `token_a` and `token_b` is blocked.
    ///
    /// The riskier token drives the decision; on a tie `token_a` wins.
    pub fn decide(&self, token_a: TokenId, token_b: TokenId) -> GateDecision {
        let a = self.assess(token_a);
        let b = self.assess(token_b);
        let worst = if a.score >= b.score { a } else { b };

        let should_block = match self.mode {
            GateMode::WarnOnly => false,
            GateMode::BlockHigh => worst.score >= self.thresholds.high,
            GateMode::Strict => worst.score >= self.thresholds.medium,
        };

        let timestamp = self.clock.now();
        if should_block {
            tracing::warn!(
                %token_a,
                %token_b,
                risky_token = %worst.token,
                score = worst.score,
                reason = %worst.reason,
                mode = ?self.mode,
                "swap blocked"
            );
            self.events.lock().push(GateEvent::SwapBlocked {
                token_a,
                token_b,
                risky_token: worst.token,
                score: worst.score,
                reason: worst.reason,
                mode: self.mode,
                timestamp,
            });
        } else if worst.score >= self.thresholds.medium {
            tracing::info!(
                %token_a,
                %token_b,
                risky_token = %worst.token,
                score = worst.score,
                reason = %worst.reason,
                "swap allowed with risk warning"
            );
            self.events.lock().push(GateEvent::SwapWarning {
                token_a,
                token_b,
                risky_token: worst.token,
                score: worst.score,
                reason: worst.reason,
                mode: self.mode,
                timestamp,
            });
        }

        GateDecision {
            should_block,
            token: worst.token,
            score: worst.score,
            reason: worst.reason,
            mode: self.mode,
        }
    }

    /// Drain the event buffer, returning all events in order.
    pub fn drain_events(&self) -> Vec<GateEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}
