//! Session records.

use rg_core::types::{Identity, SessionId, StateHash, Timestamp};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting actions.
    Active,
    /// Finalized with a state hash; terminal.
    Settled,
    /// Replaced or expired without settlement; terminal.
    Ended,
}

impl SessionStatus {
    /// `Settled` and `Ended` accept no further changes.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user: Identity,
    pub started_at: Timestamp,
    pub last_activity: Timestamp,
    pub status: SessionStatus,
    pub action_count: u32,
    /// Zero until settled.
    pub final_state_hash: StateHash,
}

impl Session {
    pub(crate) fn open(id: SessionId, user: Identity, now: Timestamp) -> Self {
        Self {
            id,
            user,
            started_at: now,
            last_activity: now,
            status: SessionStatus::Active,
            action_count: 0,
            final_state_hash: StateHash::ZERO,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Last instant at which the session still accepts actions.
    pub fn expires_at(&self, timeout_secs: u64) -> Timestamp {
        self.last_activity.plus_secs(timeout_secs)
    }

    /// `true` once `now` is strictly past the inactivity window.
    pub fn is_expired(&self, now: Timestamp, timeout_secs: u64) -> bool {
        now > self.expires_at(timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    #[test]
    fn test_open_session_defaults() {
        let s = Session::open(B256::repeat_byte(1), Address::repeat_byte(2), Timestamp(50));
        assert!(s.is_active());
        assert_eq!(s.action_count, 0);
        assert_eq!(s.final_state_hash, B256::ZERO);
        assert_eq!(s.started_at, s.last_activity);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let s = Session::open(B256::repeat_byte(1), Address::repeat_byte(2), Timestamp(100));
        assert!(!s.is_expired(Timestamp(3_700), 3_600));
        assert!(s.is_expired(Timestamp(3_701), 3_600));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Settled.is_terminal());
        assert!(SessionStatus::Ended.is_terminal());
    }
}
