//! Core types for the RiskGate workspace.
//!
//! Identities and tokens are 20-byte addresses, session identifiers and
//! settlement commitments are 32-byte hashes. The zero value of each stands
//! for "no identifier".

pub mod ids;
pub mod timestamp;

// Re-export primary types for convenient access via `rg_core::types::*`.
pub use ids::{Identity, SessionId, StateHash, TokenId};
pub use timestamp::Timestamp;
