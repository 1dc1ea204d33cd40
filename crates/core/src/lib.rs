//! # rg-core
//!
//! Shared types, traits, and utilities for the RiskGate workspace.
//!
//! This crate provides the foundational building blocks used across all other
//! crates: second-resolution ledger timestamps, the [`clock::Clock`] seam that
//! lets tests drive time by hand, address and hash identifiers, layered
//! configuration, the logging framework, and the append-only event journal.

pub mod clock;
pub mod config;
pub mod journal;
pub mod logging;
pub mod types;
