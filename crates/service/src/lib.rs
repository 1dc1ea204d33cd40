//! RiskGate service: library interface for the binary and integration tests.

pub mod engine;
pub mod events;
pub mod server;
