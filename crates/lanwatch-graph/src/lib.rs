//! LAN Watch Graph: Neo4j persistence for the host inventory.
//!
//! Networks, hosts, and discovery events are stored as `:Network`, `:Host`,
//! and `:DiscoveryEvent` nodes. Hosts are unique by IP. [`GraphInventory`]
//! exposes the graph through the `InventoryStore` contract so the discovery
//! engine never issues Cypher itself.

pub mod client;
pub mod inventory;
pub mod mutations;
pub mod queries;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use inventory::GraphInventory;
