//! Owner plus updater allow-list.

use std::collections::HashMap;

use rg_core::types::Identity;

/// Who may write risk records.
///
/// The owner is authorized at creation. Ownership and authorization are
/// tracked separately: revoking the owner's write flag leaves it the owner,
/// and transferring ownership does not authorize the new owner.
#[derive(Debug, Clone)]
pub struct AuthorizationSet {
    owner: Identity,
    updaters: HashMap<Identity, bool>,
}

impl AuthorizationSet {
    /// Create a set with `owner` as the only authorized identity.
    pub fn new(owner: Identity) -> Self {
        let mut updaters = HashMap::new();
        updaters.insert(owner, true);
        Self { owner, updaters }
    }

    /// Create a set with the owner and an initial list of updaters.
    pub fn with_updaters(owner: Identity, updaters: impl IntoIterator<Item = Identity>) -> Self {
        let mut set = Self::new(owner);
        for id in updaters {
            set.updaters.insert(id, true);
        }
        set
    }

    /// The single identity allowed to change authorization and ownership.
    pub fn owner(&self) -> Identity {
        self.owner
    }

    /// Whether `id` is the current owner, regardless of its write flag.
    pub fn is_owner(&self, id: &Identity) -> bool {
        self.owner == *id
    }

    /// Whether `id` may write risk records. Unknown identities may not.
    pub fn is_authorized(&self, id: &Identity) -> bool {
        self.updaters.get(id).copied().unwrap_or(false)
    }

    /// Set the write flag for `id`. Returns the previous flag.
    pub fn set(&mut self, id: Identity, authorized: bool) -> bool {
        self.updaters.insert(id, authorized).unwrap_or(false)
    }

    /// Replace the owner. Returns the previous owner.
    pub fn set_owner(&mut self, new_owner: Identity) -> Identity {
        std::mem::replace(&mut self.owner, new_owner)
    }

    /// Every identity with an explicit flag, revoked ones included, sorted
    /// by identity.
    pub fn entries(&self) -> Vec<(Identity, bool)> {
        let mut entries: Vec<(Identity, bool)> =
            self.updaters.iter().map(|(id, flag)| (*id, *flag)).collect();
        entries.sort();
        entries
    }
}
