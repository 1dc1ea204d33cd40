//! Registry events.

use rg_core::types::{Identity, Timestamp, TokenId};
use serde::{Deserialize, Serialize};

use crate::record::RiskScore;

/// State changes emitted by the [`RiskRegistry`](crate::RiskRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A token's record was replaced.
    ScoreUpdated {
        token: TokenId,
        holder_concentration: RiskScore,
        liquidity_ownership: RiskScore,
        governance_capture: RiskScore,
        composite: u8,
        submitter: Identity,
        timestamp: Timestamp,
    },
    /// An identity's write flag changed.
    AuthorizationChanged {
        identity: Identity,
        authorized: bool,
        changed_by: Identity,
        timestamp: Timestamp,
    },
    /// The registry owner changed.
    OwnershipTransferred {
        previous_owner: Identity,
        new_owner: Identity,
        timestamp: Timestamp,
    },
}

impl RegistryEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::ScoreUpdated { timestamp, .. }
            | Self::AuthorizationChanged { timestamp, .. }
            | Self::OwnershipTransferred { timestamp, .. } => *timestamp,
        }
    }
}
