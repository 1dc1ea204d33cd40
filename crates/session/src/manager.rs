//! Session lifecycle management.
//!
//! All session state (sessions, action logs, and the user → active session
//! table) lives in one store behind a `parking_lot::RwLock`. Starting and
//! settling a session touch several tables at once, so every mutation takes
//! the write lock and applies fully or not at all. Reads take the read lock
//! and return owned copies.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::Bytes;
use parking_lot::{Mutex, RwLock};
use rg_core::clock::Clock;
use rg_core::config::{SessionConfig, DEFAULT_MAX_ACTIONS, DEFAULT_SESSION_TIMEOUT_SECS};
use rg_core::types::ids::is_null_address;
use rg_core::types::{Identity, SessionId, StateHash, Timestamp, TokenId};
use rg_registry::RiskLookup;

use crate::action::{ActionType, SessionAction};
use crate::event::{EndCause, SessionEvent};
use crate::id::{derive_session_id, OsSeedSource, SeedSource};
use crate::session::{Session, SessionStatus};

/// Reasons a session operation is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session is unknown, settled, or ended.
    #[error("session {session} is not active")]
    NotActive { session: SessionId },
    /// The caller does not own the session.
    #[error("unauthorized: {caller} does not own session {session}")]
    Unauthorized {
        caller: Identity,
        session: SessionId,
    },
    /// The inactivity window has passed.
    #[error("session {session} expired at {expired_at}")]
    Expired {
        session: SessionId,
        expired_at: Timestamp,
    },
    /// The action cap has been reached.
    #[error("session {session} reached its limit of {cap} actions")]
    LimitReached { session: SessionId, cap: u32 },
    /// Cleanup was attempted before the inactivity window passed.
    #[error("session {session} does not expire until {expires_at}")]
    NotExpired {
        session: SessionId,
        expires_at: Timestamp,
    },
    /// A null identifier was given where a real one is required.
    #[error("invalid key: {what} must not be zero")]
    InvalidKey { what: &'static str },
}

/// Inactivity timeout and action cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub timeout_secs: u64,
    pub max_actions: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            max_actions: DEFAULT_MAX_ACTIONS,
        }
    }
}

impl From<&SessionConfig> for SessionLimits {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            timeout_secs: cfg.timeout_secs,
            max_actions: cfg.max_actions,
        }
    }
}

#[derive(Default)]
struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    actions: HashMap<SessionId, Vec<SessionAction>>,
    active_by_user: HashMap<Identity, SessionId>,
}

impl SessionStore {
    /// Look up an Active session or fail with `NotActive`.
    fn active_mut(&mut self, id: &SessionId) -> Result<&mut Session, SessionError> {
        match self.sessions.get_mut(id) {
            Some(s) if s.is_active() => Ok(s),
            _ => Err(SessionError::NotActive { session: *id }),
        }
    }

    /// Move an Active session to a terminal state and drop its action log.
    fn close(&mut self, id: &SessionId, status: SessionStatus) -> Option<Session> {
        let session = self.sessions.get_mut(id)?;
        session.status = status;
        let closed = session.clone();
        if self.active_by_user.get(&closed.user) == Some(id) {
            self.active_by_user.remove(&closed.user);
        }
        self.actions.remove(id);
        Some(closed)
    }
}

pub struct SessionManager {
    store: RwLock<SessionStore>,
    lookup: Arc<dyn RiskLookup>,
    clock: Arc<dyn Clock>,
    seeds: Box<dyn SeedSource>,
    limits: SessionLimits,
    events: Mutex<Vec<SessionEvent>>,
}

impl SessionManager {
    /// Create a manager that seeds session ids from the OS RNG.
    pub fn new(limits: SessionLimits, lookup: Arc<dyn RiskLookup>, clock: Arc<dyn Clock>) -> Self {
        Self::with_seed_source(limits, lookup, clock, Box::new(OsSeedSource))
    }

    pub fn with_seed_source(
        limits: SessionLimits,
        lookup: Arc<dyn RiskLookup>,
        clock: Arc<dyn Clock>,
        seeds: Box<dyn SeedSource>,
    ) -> Self {
        Self {
            store: RwLock::new(SessionStore::default()),
            lookup,
            clock,
            seeds,
            limits,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Timeout and action cap this manager enforces.
    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Open a new session for `user`, ending any session it already has.
    pub fn start(&self, user: Identity) -> Result<SessionId, SessionError> {
        if is_null_address(&user) {
            return Err(SessionError::InvalidKey { what: "user" });
        }

        let mut store = self.store.write();
        let now = self.clock.now();
        let mut events = self.events.lock();

        if let Some(prior) = store.active_by_user.get(&user).copied() {
            if let Some(ended) = store.close(&prior, SessionStatus::Ended) {
                tracing::info!(session = %prior, %user, "prior session replaced");
                events.push(SessionEvent::SessionEnded {
                    session: prior,
                    user,
                    cause: EndCause::Replaced,
                    action_count: ended.action_count,
                    timestamp: now,
                });
            }
        }

        let id = loop {
            let candidate = derive_session_id(&user, now, &self.seeds.seed());
            if candidate != SessionId::ZERO && !store.sessions.contains_key(&candidate) {
                break candidate;
            }
            tracing::warn!(session = %candidate, "session id collision, regenerating");
        };

        store.sessions.insert(id, Session::open(id, user, now));
        store.actions.insert(id, Vec::new());
        store.active_by_user.insert(user, id);

        tracing::info!(session = %id, %user, "session started");
        events.push(SessionEvent::SessionStarted {
            session: id,
            user,
            timestamp: now,
        });
        Ok(id)
    }

    /// Append an action to an Active session owned by `caller`.
    ///
    /// Checks, in order: the session is Active, the caller owns it, the
    /// inactivity window has not passed, the cap has not been reached.
    pub fn record_action(
        &self,
        session_id: SessionId,
        action_type: ActionType,
        token: TokenId,
        payload: Bytes,
        caller: Identity,
    ) -> Result<(), SessionError> {
        let mut store = self.store.write();
        let now = self.clock.now();
        let limits = self.limits;

        let session = store.active_mut(&session_id)?;
        if session.user != caller {
            return Err(SessionError::Unauthorized {
                caller,
                session: session_id,
            });
        }
        if session.is_expired(now, limits.timeout_secs) {
            return Err(SessionError::Expired {
                session: session_id,
                expired_at: session.expires_at(limits.timeout_secs),
            });
        }
        if session.action_count >= limits.max_actions {
            return Err(SessionError::LimitReached {
                session: session_id,
                cap: limits.max_actions,
            });
        }

        let index = session.action_count;
        session.action_count += 1;
        session.last_activity = now;
        let user = session.user;

        store.actions.entry(session_id).or_default().push(SessionAction {
            action_type: action_type.clone(),
            token,
            timestamp: now,
            payload,
        });

        tracing::debug!(session = %session_id, %user, action = %action_type, %token, index, "session action recorded");
        let mut events = self.events.lock();
        let acknowledged = action_type.is_risk_acknowledgement();
        events.push(SessionEvent::ActionRecorded {
            session: session_id,
            user,
            action_type,
            token,
            index,
            timestamp: now,
        });

        if acknowledged {
            let record = self.lookup.read(&token);
            if record.exists() {
                let composite = record.composite_score();
                tracing::info!(session = %session_id, %user, %token, composite, "risk acknowledged");
                events.push(SessionEvent::RiskAcknowledged {
                    session: session_id,
                    user,
                    token,
                    composite,
                    timestamp: now,
                });
            }
        }
        Ok(())
    }

    /// Finalize a session with `final_state_hash`.
    pub fn settle(
        &self,
        session_id: SessionId,
        final_state_hash: StateHash,
        caller: Identity,
    ) -> Result<Session, SessionError> {
        let mut store = self.store.write();
        let now = self.clock.now();

        let session = store.active_mut(&session_id)?;
        if session.user != caller {
            return Err(SessionError::Unauthorized {
                caller,
                session: session_id,
            });
        }
        session.final_state_hash = final_state_hash;

        let settled = store
            .close(&session_id, SessionStatus::Settled)
            .ok_or(SessionError::NotActive {
                session: session_id,
            })?;

        tracing::info!(
            session = %session_id,
            user = %settled.user,
            state_hash = %final_state_hash,
            actions = settled.action_count,
            "session settled"
        );
        self.events.lock().push(SessionEvent::SessionSettled {
            session: session_id,
            user: settled.user,
            final_state_hash,
            action_count: settled.action_count,
            timestamp: now,
        });
        Ok(settled)
    }

    /// End an Active session whose inactivity window has passed. Anyone may
    /// call this.
    pub fn cleanup_expired(&self, session_id: SessionId) -> Result<Session, SessionError> {
        let mut store = self.store.write();
        let now = self.clock.now();
        let timeout = self.limits.timeout_secs;

        let session = store.active_mut(&session_id)?;
        if !session.is_expired(now, timeout) {
            return Err(SessionError::NotExpired {
                session: session_id,
                expires_at: session.expires_at(timeout),
            });
        }

        let ended = store
            .close(&session_id, SessionStatus::Ended)
            .ok_or(SessionError::NotActive {
                session: session_id,
            })?;

        tracing::info!(session = %session_id, user = %ended.user, "expired session cleaned up");
        self.events.lock().push(SessionEvent::SessionEnded {
            session: session_id,
            user: ended.user,
            cause: EndCause::Expired,
            action_count: ended.action_count,
            timestamp: now,
        });
        Ok(ended)
    }

    /// Active, within the inactivity window, and below the cap.
    pub fn is_valid(&self, session_id: &SessionId) -> bool {
        let store = self.store.read();
        let now = self.clock.now();
        store.sessions.get(session_id).is_some_and(|s| {
            s.is_active()
                && !s.is_expired(now, self.limits.timeout_secs)
                && s.action_count < self.limits.max_actions
        })
    }

    /// A copy of the session in any state, or `None` if the id was never
    /// issued.
    pub fn get_session(&self, session_id: &SessionId) -> Option<Session> {
        self.store.read().sessions.get(session_id).cloned()
    }

    /// The action log, in append order. Empty once the session is closed.
    pub fn get_session_actions(&self, session_id: &SessionId) -> Vec<SessionAction> {
        self.store
            .read()
            .actions
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The user's Active session, if any. Cleared on settle and cleanup.
    pub fn get_user_active_session(&self, user: &Identity) -> Option<SessionId> {
        self.store.read().active_by_user.get(user).copied()
    }

    /// Number of currently Active sessions.
    pub fn active_count(&self) -> usize {
        self.store.read().active_by_user.len()
    }

    /// Drain the event buffer, returning all events in order.
    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}
