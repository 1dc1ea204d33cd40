//! # rg-gate
//!
//! Swap admission gate. Before a swap between two tokens, the gate reads
//! both tokens' risk records, explains the riskier one through an ordered
//! chain of reason rules, and applies the configured policy (warn only,
//! block high, or strict) to decide whether the swap is blocked.

pub mod event;
pub mod gate;
pub mod rules;

pub use event::GateEvent;
pub use gate::{Assessment, GateDecision, GateError, RiskGate, Thresholds};
pub use rg_core::config::GateMode;
pub use rules::{Finding, ReasonChain, ReasonRule, RiskReason};
