//! Read operations and node-to-domain conversion for the inventory graph.

use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use neo4rs::query;
use uuid::Uuid;

use lanwatch_core::{
    range, DiscoveryEvent, DiscoveryKind, EventId, Host, HostId, HostStatus, MonitoredNetwork,
    NetworkId,
};

use crate::client::{GraphClient, GraphError};

impl GraphClient {
    // ── Networks ─────────────────────────────────────────────────

    pub async fn get_network(&self, id: &NetworkId) -> Result<Option<MonitoredNetwork>, GraphError> {
        let q = query("MATCH (n:Network {id: $id}) RETURN n").param("id", id.0.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(network_from_node(&row_node(&row, "n")?)?)),
            None => Ok(None),
        }
    }

    pub async fn list_networks(&self) -> Result<Vec<MonitoredNetwork>, GraphError> {
        let q = query("MATCH (n:Network) RETURN n");

        let rows = self.query_rows(q).await?;
        let mut networks = Vec::with_capacity(rows.len());
        for row in rows {
            networks.push(network_from_node(&row_node(&row, "n")?)?);
        }
        sort_networks(&mut networks);
        Ok(networks)
    }

    // ── Hosts ────────────────────────────────────────────────────

    pub async fn get_host(&self, id: &HostId) -> Result<Option<Host>, GraphError> {
        let q = query("MATCH (h:Host {id: $id}) RETURN h").param("id", id.0.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(host_from_row(&row, "h")?)),
            None => Ok(None),
        }
    }

    pub async fn find_host_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Host>, GraphError> {
        let q = query("MATCH (h:Host {ip: $ip}) RETURN h LIMIT 1").param("ip", ip.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(host_from_row(&row, "h")?)),
            None => Ok(None),
        }
    }

    /// Hosts whose IP lies inside the network, ordered by address.
    ///
    /// Containment is evaluated client-side; IPs are stored as strings.
    pub async fn list_hosts_in_network(
        &self,
        network_address: Ipv4Addr,
        prefix_length: u8,
    ) -> Result<Vec<Host>, GraphError> {
        let rows = self.query_rows(query("MATCH (h:Host) RETURN h")).await?;

        let mut hosts = Vec::new();
        for row in rows {
            let host = host_from_row(&row, "h")?;
            let inside = host
                .ip
                .parse::<Ipv4Addr>()
                .map(|ip| range::contains(ip, network_address, prefix_length))
                .unwrap_or(false);
            if inside {
                hosts.push(host);
            }
        }
        hosts.sort_by_key(|h| h.ip.parse::<Ipv4Addr>().ok());
        Ok(hosts)
    }

    // ── Discovery Events ─────────────────────────────────────────

    /// Events for a network, newest first.
    pub async fn list_events(&self, network_id: &NetworkId) -> Result<Vec<DiscoveryEvent>, GraphError> {
        let q = query(
            "MATCH (e:DiscoveryEvent {network_id: $network_id})
             RETURN e ORDER BY e.occurred_at DESC",
        )
        .param("network_id", network_id.0.to_string());

        let rows = self.query_rows(q).await?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(event_from_node(&row_node(&row, "e")?)?);
        }
        Ok(events)
    }
}

// ── Conversion ───────────────────────────────────────────────────

fn row_node(row: &neo4rs::Row, key: &str) -> Result<neo4rs::Node, GraphError> {
    row.get(key)
        .map_err(|e| GraphError::Serialization(format!("Failed to deserialize node: {e}")))
}

pub(crate) fn host_from_row(row: &neo4rs::Row, key: &str) -> Result<Host, GraphError> {
    host_from_node(&row_node(row, key)?)
}

fn host_from_node(node: &neo4rs::Node) -> Result<Host, GraphError> {
    let id: String = required(node, "id")?;
    let ip: String = required(node, "ip")?;
    let status: String = node.get("status").unwrap_or_default();

    Ok(Host {
        id: HostId(parse_uuid(&id)?),
        ip,
        name: non_empty(node.get("name").ok()),
        status: HostStatus::parse(&status),
        url: non_empty(node.get("url").ok()),
        latency_ms: node.get("latency_ms").ok(),
        packet_loss_pct: node.get("packet_loss_pct").ok(),
        last_checked_at: parse_time(node.get("last_checked_at").ok()),
        first_seen: parse_time(node.get("first_seen").ok()).unwrap_or_else(Utc::now),
        tags: node.get("tags").unwrap_or_default(),
    })
}

fn network_from_node(node: &neo4rs::Node) -> Result<MonitoredNetwork, GraphError> {
    let id: String = required(node, "id")?;
    let address: String = required(node, "network_address")?;
    let prefix: i64 = required(node, "prefix_length")?;
    let interval: i64 = node
        .get("auto_scan_interval_ms")
        .unwrap_or(MonitoredNetwork::DEFAULT_INTERVAL_MS as i64);

    Ok(MonitoredNetwork {
        id: NetworkId(parse_uuid(&id)?),
        name: non_empty(node.get("name").ok()),
        network_address: Ipv4Addr::from_str(&address)
            .map_err(|e| GraphError::Serialization(format!("Bad network address {address}: {e}")))?,
        prefix_length: u8::try_from(prefix)
            .map_err(|_| GraphError::Serialization(format!("Bad prefix length {prefix}")))?,
        auto_scan_enabled: node.get("auto_scan_enabled").unwrap_or(false),
        auto_scan_interval_ms: u64::try_from(interval)
            .unwrap_or(MonitoredNetwork::DEFAULT_INTERVAL_MS),
        last_scanned_at: parse_time(node.get("last_scanned_at").ok()),
    })
}

fn event_from_node(node: &neo4rs::Node) -> Result<DiscoveryEvent, GraphError> {
    let id: String = required(node, "id")?;
    let network_id: String = required(node, "network_id")?;
    let host_id: String = required(node, "host_id")?;
    let kind: String = required(node, "kind")?;

    Ok(DiscoveryEvent {
        id: EventId(parse_uuid(&id)?),
        network_id: NetworkId(parse_uuid(&network_id)?),
        kind: DiscoveryKind::parse(&kind)
            .ok_or_else(|| GraphError::Serialization(format!("Unknown event kind: {kind}")))?,
        host_id: HostId(parse_uuid(&host_id)?),
        occurred_at: parse_time(node.get("occurred_at").ok()).unwrap_or_else(Utc::now),
    })
}

fn required<T>(node: &neo4rs::Node, key: &str) -> Result<T, GraphError>
where
    T: serde::de::DeserializeOwned,
{
    node.get(key)
        .map_err(|e| GraphError::Serialization(format!("Missing property {key}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, GraphError> {
    Uuid::parse_str(s).map_err(|e| GraphError::Serialization(format!("Bad id {s}: {e}")))
}

/// Empty strings stand for "unset".
fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.is_empty())
}

/// Numeric address order; the stored dotted-quad strings don't sort that way.
pub(crate) fn sort_networks(networks: &mut [MonitoredNetwork]) {
    networks.sort_by_key(|n| (u32::from(n.network_address), n.prefix_length));
}
