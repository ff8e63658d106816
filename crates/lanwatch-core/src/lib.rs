//! lanwatch-core: Shared types, address-range math, and the inventory contract for LAN Watch.
//!
//! This crate provides the foundational pieces used by every LAN Watch component:
//! - Host, network, and probe types
//! - Discovery events recorded during reconciliation
//! - IPv4 range expansion and descriptor parsing
//! - The `InventoryStore` trait and an in-memory implementation
//! - Common error types

pub mod error;
pub mod events;
pub mod inventory;
pub mod range;
pub mod types;

pub use error::{InventoryError, RangeError};
pub use events::{DiscoveryEvent, DiscoveryKind, EventId};
pub use inventory::{HostFields, InventoryStore, MemoryInventory};
pub use range::{AddressRange, UsableAddresses};
pub use types::{
    DiscoveredHost, Host, HostCheck, HostId, HostStatus, LivenessRecord, MonitoredNetwork,
    NetworkId, ProbeMethod, ProbeResult,
};
