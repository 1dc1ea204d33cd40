//! Session identifier generation.
//!
//! An id is `keccak256(user ‖ now_be ‖ seed)` where `seed` is 32 bytes from a
//! [`SeedSource`]. The manager retries with a fresh seed if an id is already
//! taken.

use alloy_primitives::keccak256;
use rand::RngCore;
use rg_core::types::{Identity, SessionId, Timestamp};

/// Supplies unpredictable 32-byte seeds.
pub trait SeedSource: Send + Sync {
    fn seed(&self) -> [u8; 32];
}

/// Seeds from the thread-local CSPRNG (OS-seeded ChaCha).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn seed(&self) -> [u8; 32] {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        seed
    }
}

/// Derive a session id from its inputs.
pub fn derive_session_id(user: &Identity, now: Timestamp, seed: &[u8; 32]) -> SessionId {
    let mut preimage = Vec::with_capacity(20 + 8 + 32);
    preimage.extend_from_slice(user.as_slice());
    preimage.extend_from_slice(&now.as_secs().to_be_bytes());
    preimage.extend_from_slice(seed);
    keccak256(&preimage)
}
