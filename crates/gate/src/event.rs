//! Gate events.

use rg_core::config::GateMode;
use rg_core::types::{Timestamp, TokenId};
use serde::{Deserialize, Serialize};

use crate::rules::RiskReason;

/// Emitted by [`RiskGate::decide`](crate::RiskGate::decide) when the riskier
/// token reaches the medium threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GateEvent {
    SwapBlocked {
        token_a: TokenId,
        token_b: TokenId,
        risky_token: TokenId,
        score: u8,
        reason: RiskReason,
        mode: GateMode,
        timestamp: Timestamp,
    },
    SwapWarning {
        token_a: TokenId,
        token_b: TokenId,
        risky_token: TokenId,
        score: u8,
        reason: RiskReason,
        mode: GateMode,
        timestamp: Timestamp,
    },
}
