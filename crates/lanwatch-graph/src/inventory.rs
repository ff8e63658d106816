//! `InventoryStore` over the Neo4j graph.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lanwatch_core::inventory::Result;
use lanwatch_core::{
    DiscoveryEvent, DiscoveryKind, Host, HostFields, HostId, HostStatus, InventoryStore,
    MonitoredNetwork, NetworkId,
};

use crate::client::{GraphClient, GraphConfig, GraphError};

/// Inventory persisted in Neo4j.
#[derive(Clone)]
pub struct GraphInventory {
    client: GraphClient,
}

impl GraphInventory {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Connect and make sure the schema constraints exist.
    pub async fn connect(config: &GraphConfig) -> std::result::Result<Self, GraphError> {
        let client = GraphClient::connect(config).await?;
        client.ensure_schema().await?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }
}

#[async_trait]
impl InventoryStore for GraphInventory {
    async fn get_monitored_network(&self, id: &NetworkId) -> Result<Option<MonitoredNetwork>> {
        Ok(self.client.get_network(id).await?)
    }

    async fn list_monitored_networks(&self) -> Result<Vec<MonitoredNetwork>> {
        Ok(self.client.list_networks().await?)
    }

    async fn upsert_monitored_network(&self, network: &MonitoredNetwork) -> Result<()> {
        Ok(self.client.upsert_network(network).await?)
    }

    async fn update_network_auto_scan(
        &self,
        id: &NetworkId,
        enabled: bool,
        interval_ms: u64,
    ) -> Result<()> {
        Ok(self.client.set_network_auto_scan(id, enabled, interval_ms).await?)
    }

    async fn update_network_last_scanned(&self, id: &NetworkId, at: DateTime<Utc>) -> Result<()> {
        Ok(self.client.set_network_last_scanned(id, at).await?)
    }

    async fn get_host(&self, id: &HostId) -> Result<Option<Host>> {
        Ok(self.client.get_host(id).await?)
    }

    async fn find_host_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Host>> {
        Ok(self.client.find_host_by_ip(ip).await?)
    }

    async fn list_hosts_in_network(
        &self,
        network_address: Ipv4Addr,
        prefix_length: u8,
    ) -> Result<Vec<Host>> {
        Ok(self
            .client
            .list_hosts_in_network(network_address, prefix_length)
            .await?)
    }

    async fn upsert_host(&self, ip: Ipv4Addr, fields: HostFields) -> Result<Host> {
        Ok(self.client.merge_host(ip, &fields).await?)
    }

    async fn set_host_status(
        &self,
        id: &HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
        packet_loss_pct: Option<f64>,
    ) -> Result<()> {
        Ok(self
            .client
            .set_host_status(id, status, latency_ms, packet_loss_pct)
            .await?)
    }

    async fn record_discovery_event(
        &self,
        network_id: &NetworkId,
        kind: DiscoveryKind,
        host_id: &HostId,
    ) -> Result<DiscoveryEvent> {
        Ok(self.client.create_event(network_id, kind, host_id).await?)
    }

    async fn list_discovery_events(&self, network_id: &NetworkId) -> Result<Vec<DiscoveryEvent>> {
        Ok(self.client.list_events(network_id).await?)
    }

    async fn clear_discovery_events(&self, network_id: &NetworkId) -> Result<usize> {
        Ok(self.client.delete_events(network_id).await?)
    }
}
