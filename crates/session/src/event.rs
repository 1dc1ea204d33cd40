//! Session events.

use rg_core::types::{Identity, SessionId, StateHash, Timestamp, TokenId};
use serde::{Deserialize, Serialize};

use crate::action::ActionType;

/// Why a session ended without settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCause {
    /// The user started a new session.
    Replaced,
    /// Cleaned up after the inactivity timeout.
    Expired,
}

/// State changes emitted by the [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session: SessionId,
        user: Identity,
        timestamp: Timestamp,
    },
    SessionEnded {
        session: SessionId,
        user: Identity,
        cause: EndCause,
        action_count: u32,
        timestamp: Timestamp,
    },
    ActionRecorded {
        session: SessionId,
        user: Identity,
        action_type: ActionType,
        token: TokenId,
        /// Zero-based position in the action log.
        index: u32,
        timestamp: Timestamp,
    },
    RiskAcknowledged {
        session: SessionId,
        user: Identity,
        token: TokenId,
        composite: u8,
        timestamp: Timestamp,
    },
    SessionSettled {
        session: SessionId,
        user: Identity,
        final_state_hash: StateHash,
        action_count: u32,
        timestamp: Timestamp,
    },
}
