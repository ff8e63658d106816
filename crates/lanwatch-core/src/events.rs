//! Discovery events recorded during reconciliation.
//!
//! Events form an append-only audit trail per network. The UI consumes them
//! and the operator can clear them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{HostId, NetworkId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// What reconciliation observed about a host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    /// A live address with no inventory entry was added.
    NewDevice,
    /// A host previously online was absent from the sweep.
    Disconnected,
}

impl DiscoveryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewDevice => "new_device",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_device" => Some(Self::NewDevice),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

/// An entry in a network's discovery audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryEvent {
    pub id: EventId,
    pub network_id: NetworkId,
    pub kind: DiscoveryKind,
    pub host_id: HostId,
    pub occurred_at: DateTime<Utc>,
}

impl DiscoveryEvent {
    pub fn new(network_id: NetworkId, kind: DiscoveryKind, host_id: HostId) -> Self {
        Self {
            id: EventId::new(),
            network_id,
            kind,
            host_id,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_roundtrip() {
        let event = DiscoveryEvent::new(NetworkId::new(), DiscoveryKind::NewDevice, HostId::new());

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: DiscoveryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn event_kind_tags() {
        let json = serde_json::to_string(&DiscoveryKind::Disconnected).unwrap();
        assert_eq!(json, "\"disconnected\"");

        let json = serde_json::to_string(&DiscoveryKind::NewDevice).unwrap();
        assert_eq!(json, "\"new_device\"");
    }

    #[test]
    fn stored_kind_strings_match_serde() {
        for kind in [DiscoveryKind::NewDevice, DiscoveryKind::Disconnected] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.as_str());
            assert_eq!(DiscoveryKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DiscoveryKind::parse("bogus"), None);
    }
}
