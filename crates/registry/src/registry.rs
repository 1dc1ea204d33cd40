//! The token risk registry.
//!
//! [`RiskRegistry`] stores one [`RiskRecord`] per token in a `DashMap`. A
//! write holds the token's map entry while it stamps the time, replaces the
//! record and buffers the event, so writes to the same token are serialized
//! and the event order matches the stored value. The authorization set sits
//! behind a `parking_lot::RwLock`; updates hold the read side for their whole
//! duration so a concurrent revocation cannot interleave with a write.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rg_core::clock::Clock;
use rg_core::types::ids::is_null_address;
use rg_core::types::{Identity, TokenId};

use crate::access::AuthorizationSet;
use crate::event::RegistryEvent;
use crate::record::{RiskRecord, RiskScore};

/// Reasons a registry write is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The caller lacks the required role.
    #[error("unauthorized: {caller} may not {action}")]
    Unauthorized {
        caller: Identity,
        action: &'static str,
    },
    /// A score is outside `[0, 100]`.
    #[error("score out of range: {field} = {value}, max 100")]
    OutOfRange { field: &'static str, value: u32 },
    /// A null identifier was given where a real one is required.
    #[error("invalid key: {what} must not be the zero address")]
    InvalidKey { what: &'static str },
}

/// One entry of a score write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreUpdate {
    pub token: TokenId,
    pub holder_concentration: u32,
    pub liquidity_ownership: u32,
    pub governance_capture: u32,
}

/// Read access to risk records.
///
/// The session manager and the swap gate depend on this rather than on the
/// concrete registry.
pub trait RiskLookup: Send + Sync {
    /// The record for `token`, or the absent record.
    fn read(&self, token: &TokenId) -> RiskRecord;

    /// Floor average of the three scores, or 0 when absent.
    fn composite_score(&self, token: &TokenId) -> u8 {
        self.read(token).composite_score()
    }
}

/// Validated scores ready to store.
struct Scores {
    holder: RiskScore,
    liquidity: RiskScore,
    governance: RiskScore,
}

pub struct RiskRegistry {
    records: DashMap<TokenId, RiskRecord>,
    access: RwLock<AuthorizationSet>,
    clock: Arc<dyn Clock>,
    events: Mutex<Vec<RegistryEvent>>,
}

impl RiskRegistry {
    /// Create an empty registry.
    pub fn new(access: AuthorizationSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            access: RwLock::new(access),
            clock,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Replace the record for `token`.
    ///
    /// Checks, in order: the caller is authorized, the token is not the zero
    /// address, every score is at most 100. A refused write leaves the prior
    /// record untouched.
    pub fn update(
        &self,
        token: TokenId,
        holder_concentration: u32,
        liquidity_ownership: u32,
        governance_capture: u32,
        caller: Identity,
    ) -> Result<RiskRecord, RegistryError> {
        let access = self.access.read();
        Self::require_authorized(&access, caller)?;
        let entry = ScoreUpdate {
            token,
            holder_concentration,
            liquidity_ownership,
            governance_capture,
        };
        match Self::validate(&entry) {
            Ok(scores) => Ok(self.store(token, scores, caller)),
            Err(e) => {
                tracing::debug!(%token, %caller, error = %e, "score update refused");
                Err(e)
            }
        }
    }

    /// Apply several writes atomically.
    ///
    /// Every entry is validated before any is stored; if one fails nothing
    /// is written.
    pub fn update_batch(
        &self,
        entries: &[ScoreUpdate],
        caller: Identity,
    ) -> Result<Vec<RiskRecord>, RegistryError> {
        let access = self.access.read();
        Self::require_authorized(&access, caller)?;
        let validated = entries
            .iter()
            .map(|e| Self::validate(e).map(|s| (e.token, s)))
            .collect::<Result<Vec<_>, _>>()?;

        let records = validated
            .into_iter()
            .map(|(token, scores)| self.store(token, scores, caller))
            .collect();
        Ok(records)
    }

    /// The record for `token`, or the absent record. Never fails.
    pub fn read(&self, token: &TokenId) -> RiskRecord {
        self.records
            .get(token)
            .map(|r| *r)
            .unwrap_or_else(RiskRecord::absent)
    }

    /// `true` once `token` has been written.
    pub fn exists(&self, token: &TokenId) -> bool {
        self.read(token).exists()
    }

    /// Floor average of the three scores, or 0 when absent.
    pub fn composite_score(&self, token: &TokenId) -> u8 {
        self.read(token).composite_score()
    }

    /// Seconds since the record was written, or 0 when absent.
    pub fn data_age(&self, token: &TokenId) -> u64 {
        let record = self.read(token);
        if !record.exists() {
            return 0;
        }
        self.clock.now().elapsed_since(&record.last_updated)
    }

    /// Grant or revoke write access. Owner only.
    pub fn set_authorized(
        &self,
        identity: Identity,
        authorized: bool,
        caller: Identity,
    ) -> Result<(), RegistryError> {
        let mut access = self.access.write();
        if !access.is_owner(&caller) {
            return Err(RegistryError::Unauthorized {
                caller,
                action: "change authorization",
            });
        }
        if is_null_address(&identity) {
            return Err(RegistryError::InvalidKey { what: "identity" });
        }

        access.set(identity, authorized);
        let timestamp = self.clock.now();
        tracing::info!(%identity, authorized, changed_by = %caller, "updater authorization changed");
        self.events.lock().push(RegistryEvent::AuthorizationChanged {
            identity,
            authorized,
            changed_by: caller,
            timestamp,
        });
        Ok(())
    }

    /// Hand ownership to `new_owner`. Owner only.
    pub fn transfer_ownership(
        &self,
        new_owner: Identity,
        caller: Identity,
    ) -> Result<(), RegistryError> {
        let mut access = self.access.write();
        if !access.is_owner(&caller) {
            return Err(RegistryError::Unauthorized {
                caller,
                action: "transfer ownership",
            });
        }
        if is_null_address(&new_owner) {
            return Err(RegistryError::InvalidKey { what: "new owner" });
        }

        let previous_owner = access.set_owner(new_owner);
        let timestamp = self.clock.now();
        tracing::warn!(%previous_owner, %new_owner, "registry ownership transferred");
        self.events.lock().push(RegistryEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
            timestamp,
        });
        Ok(())
    }

    /// Current owner.
    pub fn owner(&self) -> Identity {
        self.access.read().owner()
    }

    /// Whether `identity` may currently write scores.
    pub fn is_authorized(&self, identity: &Identity) -> bool {
        self.access.read().is_authorized(identity)
    }

    /// Number of tokens with a record.
    pub fn token_count(&self) -> usize {
        self.records.len()
    }

    /// Drain the event buffer, returning all events in order.
    pub fn drain_events(&self) -> Vec<RegistryEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// The current state as the shortest event sequence that
    /// [`restore`](Self::restore) rebuilds it from: the owner, every explicit
    /// authorization flag, then one `ScoreUpdated` per token with its stored
    /// timestamp and submitter. Nothing is buffered for the journal.
    pub fn snapshot(&self) -> Vec<RegistryEvent> {
        let access = self.access.read();
        let owner = access.owner();
        let now = self.clock.now();

        let mut events = vec![RegistryEvent::OwnershipTransferred {
            previous_owner: owner,
            new_owner: owner,
            timestamp: now,
        }];
        events.extend(access.entries().into_iter().map(|(identity, authorized)| {
            RegistryEvent::AuthorizationChanged {
                identity,
                authorized,
                changed_by: owner,
                timestamp: now,
            }
        }));

        let mut records: Vec<(TokenId, RiskRecord)> =
            self.records.iter().map(|e| (*e.key(), *e.value())).collect();
        records.sort_by_key(|(token, _)| *token);
        events.extend(records.into_iter().map(|(token, record)| {
            RegistryEvent::ScoreUpdated {
                token,
                holder_concentration: record.holder_concentration,
                liquidity_ownership: record.liquidity_ownership,
                governance_capture: record.governance_capture,
                composite: record.composite_score(),
                submitter: record.submitter,
                timestamp: record.last_updated,
            }
        }));
        events
    }

    /// Rebuild state from previously journaled events.
    ///
    /// Events are applied verbatim (their own timestamps and submitters) and
    /// are not re-emitted. Returns the number of events applied.
    pub fn restore<'a, I>(&self, events: I) -> usize
    where
        I: IntoIterator<Item = &'a RegistryEvent>,
    {
        let mut access = self.access.write();
        let mut applied = 0;
        for event in events {
            match event {
                RegistryEvent::ScoreUpdated {
                    token,
                    holder_concentration,
                    liquidity_ownership,
                    governance_capture,
                    submitter,
                    timestamp,
                    ..
                } => {
                    self.records.insert(
                        *token,
                        RiskRecord {
                            holder_concentration: *holder_concentration,
                            liquidity_ownership: *liquidity_ownership,
                            governance_capture: *governance_capture,
                            last_updated: *timestamp,
                            submitter: *submitter,
                        },
                    );
                }
                RegistryEvent::AuthorizationChanged {
                    identity,
                    authorized,
                    ..
                } => {
                    access.set(*identity, *authorized);
                }
                RegistryEvent::OwnershipTransferred { new_owner, .. } => {
                    access.set_owner(*new_owner);
                }
            }
            applied += 1;
        }
        tracing::info!(applied, tokens = self.records.len(), "registry restored from journal");
        applied
    }

    fn require_authorized(
        access: &AuthorizationSet,
        caller: Identity,
    ) -> Result<(), RegistryError> {
        if access.is_authorized(&caller) {
            Ok(())
        } else {
            tracing::debug!(%caller, "unauthorized score update");
            Err(RegistryError::Unauthorized {
                caller,
                action: "update risk scores",
            })
        }
    }

    fn validate(entry: &ScoreUpdate) -> Result<Scores, RegistryError> {
        if is_null_address(&entry.token) {
            return Err(RegistryError::InvalidKey { what: "token" });
        }
        let score = |field: &'static str, value: u32| {
            RiskScore::new(value).ok_or(RegistryError::OutOfRange { field, value })
        };
        Ok(Scores {
            holder: score("holder_concentration", entry.holder_concentration)?,
            liquidity: score("liquidity_ownership", entry.liquidity_ownership)?,
            governance: score("governance_capture", entry.governance_capture)?,
        })
    }

    fn store(&self, token: TokenId, scores: Scores, submitter: Identity) -> RiskRecord {
        let mut slot = self.records.entry(token).or_default();
        let record = RiskRecord {
            holder_concentration: scores.holder,
            liquidity_ownership: scores.liquidity,
            governance_capture: scores.governance,
            last_updated: self.clock.now(),
            submitter,
        };
        *slot = record;

        let composite = record.composite_score();
        tracing::info!(
            %token,
            holder = %record.holder_concentration,
            liquidity = %record.liquidity_ownership,
            governance = %record.governance_capture,
            composite,
            %submitter,
            "risk score updated"
        );
        self.events.lock().push(RegistryEvent::ScoreUpdated {
            token,
            holder_concentration: record.holder_concentration,
            liquidity_ownership: record.liquidity_ownership,
            governance_capture: record.governance_capture,
            composite,
            submitter,
            timestamp: record.last_updated,
        });
        record
    }
}

impl RiskLookup for RiskRegistry {
    fn read(&self, token: &TokenId) -> RiskRecord {
        RiskRegistry::read(self, token)
    }
}
