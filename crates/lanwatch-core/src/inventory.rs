//! The inventory store contract consumed by the discovery engine, plus an
//! in-process implementation.
//!
//! The inventory is owned by the dashboard's persistence layer; discovery only
//! reads networks and hosts and writes status, events, and scan timestamps.
//! Every mutation is atomic per host; concurrent writes to the same host
//! resolve last-write-wins.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::InventoryError;
use crate::events::{DiscoveryEvent, DiscoveryKind};
use crate::range;
use crate::types::{Host, HostId, HostStatus, MonitoredNetwork, NetworkId};

pub type Result<T> = std::result::Result<T, InventoryError>;

/// Fields written by [`InventoryStore::upsert_host`]. `None` leaves the
/// stored value untouched on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostFields {
    pub name: Option<String>,
    pub status: Option<HostStatus>,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    pub url: Option<String>,
}

/// Persistence operations the discovery engine depends on.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_monitored_network(&self, id: &NetworkId) -> Result<Option<MonitoredNetwork>>;

    async fn list_monitored_networks(&self) -> Result<Vec<MonitoredNetwork>>;

    /// Insert or replace a network definition (matched by id).
    async fn upsert_monitored_network(&self, network: &MonitoredNetwork) -> Result<()>;

    async fn update_network_auto_scan(
        &self,
        id: &NetworkId,
        enabled: bool,
        interval_ms: u64,
    ) -> Result<()>;

    async fn update_network_last_scanned(&self, id: &NetworkId, at: DateTime<Utc>) -> Result<()>;

    async fn get_host(&self, id: &HostId) -> Result<Option<Host>>;

    async fn find_host_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Host>>;

    /// Hosts whose IP lies inside `network_address/prefix_length`.
    async fn list_hosts_in_network(
        &self,
        network_address: Ipv4Addr,
        prefix_length: u8,
    ) -> Result<Vec<Host>>;

    /// Create the host for `ip` if absent, otherwise update the given fields.
    async fn upsert_host(&self, ip: Ipv4Addr, fields: HostFields) -> Result<Host>;

    /// Write the latest observed status and stamp `last_checked_at`.
    async fn set_host_status(
        &self,
        id: &HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
        packet_loss_pct: Option<f64>,
    ) -> Result<()>;

    async fn record_discovery_event(
        &self,
        network_id: &NetworkId,
        kind: DiscoveryKind,
        host_id: &HostId,
    ) -> Result<DiscoveryEvent>;

    /// Events for a network, newest first.
    async fn list_discovery_events(&self, network_id: &NetworkId) -> Result<Vec<DiscoveryEvent>>;

    /// Remove all events for a network, returning how many were removed.
    async fn clear_discovery_events(&self, network_id: &NetworkId) -> Result<usize>;
}

#[derive(Default)]
struct Inner {
    networks: HashMap<NetworkId, MonitoredNetwork>,
    hosts: HashMap<HostId, Host>,
    by_ip: HashMap<Ipv4Addr, HostId>,
    events: Vec<DiscoveryEvent>,
}

/// In-memory inventory backed by a single `RwLock`.
///
/// Used by the daemon when no graph backend is configured, and by tests.
#[derive(Default)]
pub struct MemoryInventory {
    inner: RwLock<Inner>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| InventoryError::Internal("inventory lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| InventoryError::Internal("inventory lock poisoned".to_string()))
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn get_monitored_network(&self, id: &NetworkId) -> Result<Option<MonitoredNetwork>> {
        Ok(self.read()?.networks.get(id).cloned())
    }

    async fn list_monitored_networks(&self) -> Result<Vec<MonitoredNetwork>> {
        let mut networks: Vec<_> = self.read()?.networks.values().cloned().collect();
        networks.sort_by_key(|n| (u32::from(n.network_address), n.prefix_length));
        Ok(networks)
    }

    async fn upsert_monitored_network(&self, network: &MonitoredNetwork) -> Result<()> {
        self.write()?.networks.insert(network.id, network.clone());
        Ok(())
    }

    async fn update_network_auto_scan(
        &self,
        id: &NetworkId,
        enabled: bool,
        interval_ms: u64,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let network = inner.networks.get_mut(id).ok_or_else(|| InventoryError::NotFound {
            entity: "network",
            id: id.to_string(),
        })?;
        network.auto_scan_enabled = enabled;
        network.auto_scan_interval_ms = interval_ms;
        Ok(())
    }

    async fn update_network_last_scanned(&self, id: &NetworkId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.write()?;
        let network = inner.networks.get_mut(id).ok_or_else(|| InventoryError::NotFound {
            entity: "network",
            id: id.to_string(),
        })?;
        network.last_scanned_at = Some(at);
        Ok(())
    }

    async fn get_host(&self, id: &HostId) -> Result<Option<Host>> {
        Ok(self.read()?.hosts.get(id).cloned())
    }

    async fn find_host_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Host>> {
        let inner = self.read()?;
        Ok(inner
            .by_ip
            .get(&ip)
            .and_then(|id| inner.hosts.get(id))
            .cloned())
    }

    async fn list_hosts_in_network(
        &self,
        network_address: Ipv4Addr,
        prefix_length: u8,
    ) -> Result<Vec<Host>> {
        let inner = self.read()?;
        let mut hosts: Vec<Host> = inner
            .by_ip
            .iter()
            .filter(|(ip, _)| range::contains(**ip, network_address, prefix_length))
            .filter_map(|(_, id)| inner.hosts.get(id).cloned())
            .collect();
        hosts.sort_by_key(|h| h.ip.parse::<Ipv4Addr>().ok());
        Ok(hosts)
    }

    async fn upsert_host(&self, ip: Ipv4Addr, fields: HostFields) -> Result<Host> {
        let mut inner = self.write()?;
        let now = Utc::now();

        if let Some(id) = inner.by_ip.get(&ip).copied() {
            let host = inner.hosts.get_mut(&id).ok_or_else(|| {
                InventoryError::Internal(format!("ip index points at missing host {id}"))
            })?;
            if fields.name.is_some() {
                host.name = fields.name;
            }
            if let Some(status) = fields.status {
                host.status = status;
                host.last_checked_at = Some(now);
            }
            if fields.latency_ms.is_some() {
                host.latency_ms = fields.latency_ms;
            }
            if fields.packet_loss_pct.is_some() {
                host.packet_loss_pct = fields.packet_loss_pct;
            }
            if fields.url.is_some() {
                host.url = fields.url;
            }
            return Ok(host.clone());
        }

        let host = Host {
            id: HostId::new(),
            ip: ip.to_string(),
            name: fields.name,
            status: fields.status.unwrap_or(HostStatus::Offline),
            url: fields.url,
            latency_ms: fields.latency_ms,
            packet_loss_pct: fields.packet_loss_pct,
            last_checked_at: fields.status.map(|_| now),
            first_seen: now,
            tags: Vec::new(),
        };
        inner.by_ip.insert(ip, host.id);
        inner.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn set_host_status(
        &self,
        id: &HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
        packet_loss_pct: Option<f64>,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let host = inner.hosts.get_mut(id).ok_or_else(|| InventoryError::NotFound {
            entity: "host",
            id: id.to_string(),
        })?;
        host.status = status;
        host.latency_ms = latency_ms;
        host.packet_loss_pct = packet_loss_pct;
        host.last_checked_at = Some(Utc::now());
        Ok(())
    }

    async fn record_discovery_event(
        &self,
        network_id: &NetworkId,
        kind: DiscoveryKind,
        host_id: &HostId,
    ) -> Result<DiscoveryEvent> {
        let event = DiscoveryEvent::new(*network_id, kind, *host_id);
        self.write()?.events.push(event.clone());
        Ok(event)
    }

    async fn list_discovery_events(&self, network_id: &NetworkId) -> Result<Vec<DiscoveryEvent>> {
        Ok(self
            .read()?
            .events
            .iter()
            .rev()
            .filter(|e| &e.network_id == network_id)
            .cloned()
            .collect())
    }

    async fn clear_discovery_events(&self, network_id: &NetworkId) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.events.len();
        inner.events.retain(|e| &e.network_id != network_id);
        Ok(before - inner.events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, last)
    }

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let inv = MemoryInventory::new();
        let created = inv
            .upsert_host(
                ip(10),
                HostFields {
                    name: Some("nas".to_string()),
                    status: Some(HostStatus::Online),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.ip, "192.168.1.10");
        assert_eq!(created.status, HostStatus::Online);
        assert!(created.last_checked_at.is_some());

        let updated = inv
            .upsert_host(
                ip(10),
                HostFields {
                    latency_ms: Some(1.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name.as_deref(), Some("nas"));
        assert_eq!(updated.latency_ms, Some(1.5));
    }

    #[tokio::test]
    async fn list_hosts_filters_by_network() {
        let inv = MemoryInventory::new();
        inv.upsert_host(ip(1), HostFields::default()).await.unwrap();
        inv.upsert_host(ip(2), HostFields::default()).await.unwrap();
        inv.upsert_host(Ipv4Addr::new(10, 0, 0, 1), HostFields::default())
            .await
            .unwrap();

        let hosts = inv.list_hosts_in_network(ip(0), 24).await.unwrap();
        assert_eq!(hosts.len(), 2);
        assert!(hosts.iter().all(|h| h.ip.starts_with("192.168.1.")));
    }

    #[tokio::test]
    async fn set_status_on_missing_host_is_not_found() {
        let inv = MemoryInventory::new();
        let err = inv
            .set_host_status(&HostId::new(), HostStatus::Online, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { entity: "host", .. }));
    }

    #[tokio::test]
    async fn events_are_listed_newest_first_and_cleared_per_network() {
        let inv = MemoryInventory::new();
        let (net_a, net_b) = (NetworkId::new(), NetworkId::new());
        let host = HostId::new();

        inv.record_discovery_event(&net_a, DiscoveryKind::NewDevice, &host)
            .await
            .unwrap();
        inv.record_discovery_event(&net_a, DiscoveryKind::Disconnected, &host)
            .await
            .unwrap();
        inv.record_discovery_event(&net_b, DiscoveryKind::NewDevice, &host)
            .await
            .unwrap();

        let events = inv.list_discovery_events(&net_a).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, DiscoveryKind::Disconnected);

        assert_eq!(inv.clear_discovery_events(&net_a).await.unwrap(), 2);
        assert!(inv.list_discovery_events(&net_a).await.unwrap().is_empty());
        assert_eq!(inv.list_discovery_events(&net_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn network_updates() {
        let inv = MemoryInventory::new();
        let net = MonitoredNetwork::new(ip(0), 24);
        inv.upsert_monitored_network(&net).await.unwrap();

        inv.update_network_auto_scan(&net.id, true, 60_000)
            .await
            .unwrap();
        let at = Utc::now();
        inv.update_network_last_scanned(&net.id, at).await.unwrap();

        let stored = inv.get_monitored_network(&net.id).await.unwrap().unwrap();
        assert!(stored.auto_scan_enabled);
        assert_eq!(stored.auto_scan_interval_ms, 60_000);
        assert_eq!(stored.last_scanned_at, Some(at));
    }
}
