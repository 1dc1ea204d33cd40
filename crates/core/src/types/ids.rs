//! Identifier aliases.
//!
//! These are thin aliases over [`alloy_primitives`] so that callers can parse
//! and print checksummed hex without any conversion layer.

use alloy_primitives::{Address, B256};

/// Identity of a caller: an owner, an authorized updater, or a session user.
pub type Identity = Address;

/// Token identifier keyed in the risk registry.
pub type TokenId = Address;

/// Session identifier allocated by the session manager.
pub type SessionId = B256;

/// Final state commitment stamped on a settled session.
pub type StateHash = B256;

/// Returns `true` for the null identity / token (`0x000…0`).
#[inline]
pub fn is_null_address(addr: &Address) -> bool {
    *addr == Address::ZERO
}
