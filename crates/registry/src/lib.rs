//! # rg-registry
//!
//! Persistent token risk registry. Every token maps to three bounded risk
//! scores (holder concentration, liquidity ownership, governance capture),
//! the time they were written, and who wrote them. Writes are gated by an
//! owner plus an allow-list of updaters; reads are total and never fail.

pub mod access;
pub mod event;
pub mod record;
pub mod registry;

pub use access::AuthorizationSet;
pub use event::RegistryEvent;
pub use record::{RiskRecord, RiskScore, MAX_SCORE};
pub use registry::{RegistryError, RiskLookup, RiskRegistry, ScoreUpdate};
