//! Declared session actions.

use alloy_primitives::Bytes;
use rg_core::types::{Timestamp, TokenId};
use serde::{Deserialize, Serialize};

/// What kind of action the user declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Approve,
    /// The user saw the token's risk data and chose to proceed.
    AcknowledgeRisk,
    /// Application-defined tag.
    Custom(String),
}

impl ActionType {
    pub fn is_risk_acknowledgement(&self) -> bool {
        matches!(self, Self::AcknowledgeRisk)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Swap => write!(f, "swap"),
            Self::AddLiquidity => write!(f, "add_liquidity"),
            Self::RemoveLiquidity => write!(f, "remove_liquidity"),
            Self::Approve => write!(f, "approve"),
            Self::AcknowledgeRisk => write!(f, "acknowledge_risk"),
            Self::Custom(tag) => write!(f, "custom:{}", tag),
        }
    }
}

/// One entry of a session's append-only action log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAction {
    pub action_type: ActionType,
    pub token: TokenId,
    pub timestamp: Timestamp,
    /// Opaque to the manager.
    pub payload: Bytes,
}
