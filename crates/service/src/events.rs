//! Unified event stream.
//!
//! Every component buffers its own events. [`ServiceEvent`] tags them by
//! source so one journal can hold all of them. Within a source the journal
//! keeps emission order; each flush writes registry events, then session
//! events, then gate events, so order across sources is only preserved
//! between flushes.

use rg_gate::GateEvent;
use rg_registry::RegistryEvent;
use rg_session::SessionEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "payload", rename_all = "snake_case")]
pub enum ServiceEvent {
    Registry(RegistryEvent),
    Session(SessionEvent),
    Gate(GateEvent),
}

impl ServiceEvent {
    /// The registry event, if this is one.
    pub fn as_registry(&self) -> Option<&RegistryEvent> {
        match self {
            Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use rg_core::types::Timestamp;

    #[test]
    fn test_tagged_wire_format() {
        let event = ServiceEvent::Registry(RegistryEvent::OwnershipTransferred {
            previous_owner: Address::repeat_byte(1),
            new_owner: Address::repeat_byte(2),
            timestamp: Timestamp(7),
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "registry");
        assert_eq!(json["payload"]["event"], "ownership_transferred");
        assert_eq!(json["payload"]["timestamp"], 7);

        let back: ServiceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert!(back.as_registry().is_some());
    }
}
