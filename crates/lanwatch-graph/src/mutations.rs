//! Write operations for the inventory graph.
//!
//! Networks are identified by `id`, hosts by `ip`. Upserts use MERGE so
//! re-discovering an address never duplicates a host. Timestamps are stored
//! as RFC 3339 strings.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use neo4rs::query;

use lanwatch_core::{
    DiscoveryEvent, DiscoveryKind, Host, HostFields, HostId, HostStatus, MonitoredNetwork,
    NetworkId,
};

use crate::client::{GraphClient, GraphError};
use crate::queries::host_from_row;

impl GraphClient {
    // ── Networks ─────────────────────────────────────────────────

    /// Insert or replace a monitored network.
    pub async fn upsert_network(&self, network: &MonitoredNetwork) -> Result<(), GraphError> {
        let q = query(
            "MERGE (n:Network {id: $id})
             SET n.name = $name,
                 n.network_address = $network_address,
                 n.prefix_length = $prefix_length,
                 n.auto_scan_enabled = $auto_scan_enabled,
                 n.auto_scan_interval_ms = $auto_scan_interval_ms,
                 n.last_scanned_at = $last_scanned_at",
        )
        .param("id", network.id.0.to_string())
        .param("name", opt_string(&network.name))
        .param("network_address", network.network_address.to_string())
        .param("prefix_length", network.prefix_length as i64)
        .param("auto_scan_enabled", network.auto_scan_enabled)
        .param("auto_scan_interval_ms", network.auto_scan_interval_ms as i64)
        .param(
            "last_scanned_at",
            network.last_scanned_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        );

        self.run(q).await
    }

    /// Update a network's auto-scan settings.
    pub async fn set_network_auto_scan(
        &self,
        id: &NetworkId,
        enabled: bool,
        interval_ms: u64,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (n:Network {id: $id})
             SET n.auto_scan_enabled = $enabled, n.auto_scan_interval_ms = $interval_ms
             RETURN n.id AS id",
        )
        .param("id", id.0.to_string())
        .param("enabled", enabled)
        .param("interval_ms", interval_ms as i64);

        self.require_match(q, "Network", id.to_string()).await
    }

    /// Stamp a network's last completed scan.
    pub async fn set_network_last_scanned(
        &self,
        id: &NetworkId,
        at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (n:Network {id: $id})
             SET n.last_scanned_at = $at
             RETURN n.id AS id",
        )
        .param("id", id.0.to_string())
        .param("at", at.to_rfc3339());

        self.require_match(q, "Network", id.to_string()).await
    }

    // ── Hosts ────────────────────────────────────────────────────

    /// Create the host for `ip` or update the provided fields.
    ///
    /// Empty-string parameters leave the stored property unchanged.
    pub async fn merge_host(&self, ip: Ipv4Addr, fields: &HostFields) -> Result<Host, GraphError> {
        let now = Utc::now().to_rfc3339();
        let q = query(
            "MERGE (h:Host {ip: $ip})
             ON CREATE SET
               h.id = $id, h.first_seen = $now, h.status = 'offline',
               h.name = '', h.url = '', h.last_checked_at = '', h.tags = []
             SET
               h.name = CASE WHEN $name = '' THEN h.name ELSE $name END,
               h.url = CASE WHEN $url = '' THEN h.url ELSE $url END,
               h.status = CASE WHEN $status = '' THEN h.status ELSE $status END,
               h.last_checked_at = CASE WHEN $status = '' THEN h.last_checked_at ELSE $now END,
               h.latency_ms = CASE WHEN $has_latency THEN $latency_ms ELSE h.latency_ms END,
               h.packet_loss_pct = CASE WHEN $has_loss THEN $packet_loss_pct ELSE h.packet_loss_pct END
             RETURN h",
        )
        .param("ip", ip.to_string())
        .param("id", HostId::new().0.to_string())
        .param("now", now)
        .param("name", opt_string(&fields.name))
        .param("url", opt_string(&fields.url))
        .param(
            "status",
            fields.status.map(|s| s.as_str().to_string()).unwrap_or_default(),
        )
        .param("has_latency", fields.latency_ms.is_some())
        .param("latency_ms", fields.latency_ms.unwrap_or_default())
        .param("has_loss", fields.packet_loss_pct.is_some())
        .param("packet_loss_pct", fields.packet_loss_pct.unwrap_or_default());

        match self.query_one(q).await? {
            Some(row) => host_from_row(&row, "h"),
            None => Err(GraphError::NotFound {
                label: "Host",
                id: ip.to_string(),
            }),
        }
    }

    /// Write a host's latest observed status.
    pub async fn set_host_status(
        &self,
        id: &HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
        packet_loss_pct: Option<f64>,
    ) -> Result<(), GraphError> {
        // Absent measurements are removed (SET to null).
        let q = query(
            "MATCH (h:Host {id: $id})
             SET h.status = $status,
                 h.latency_ms = CASE WHEN $has_latency THEN $latency_ms ELSE null END,
                 h.packet_loss_pct = CASE WHEN $has_loss THEN $packet_loss_pct ELSE null END,
                 h.last_checked_at = $now
             RETURN h.id AS id",
        )
        .param("id", id.0.to_string())
        .param("status", status.as_str().to_string())
        .param("has_latency", latency_ms.is_some())
        .param("latency_ms", latency_ms.unwrap_or_default())
        .param("has_loss", packet_loss_pct.is_some())
        .param("packet_loss_pct", packet_loss_pct.unwrap_or_default())
        .param("now", Utc::now().to_rfc3339());

        self.require_match(q, "Host", id.to_string()).await
    }

    // ── Discovery Events ─────────────────────────────────────────

    /// Append an event to a network's audit trail.
    pub async fn create_event(
        &self,
        network_id: &NetworkId,
        kind: DiscoveryKind,
        host_id: &HostId,
    ) -> Result<DiscoveryEvent, GraphError> {
        let event = DiscoveryEvent::new(*network_id, kind, *host_id);
        let q = query(
            "CREATE (e:DiscoveryEvent {
               id: $id, network_id: $network_id, kind: $kind,
               host_id: $host_id, occurred_at: $occurred_at
             })",
        )
        .param("id", event.id.0.to_string())
        .param("network_id", network_id.0.to_string())
        .param("kind", kind.as_str().to_string())
        .param("host_id", host_id.0.to_string())
        .param("occurred_at", event.occurred_at.to_rfc3339());

        self.run(q).await?;
        Ok(event)
    }

    /// Delete every event recorded for a network.
    pub async fn delete_events(&self, network_id: &NetworkId) -> Result<usize, GraphError> {
        let q = query(
            "MATCH (e:DiscoveryEvent {network_id: $network_id})
             DETACH DELETE e
             RETURN count(e) AS removed",
        )
        .param("network_id", network_id.0.to_string());

        let removed: i64 = match self.query_one(q).await? {
            Some(row) => row
                .get("removed")
                .map_err(|e| GraphError::Serialization(e.to_string()))?,
            None => 0,
        };
        Ok(removed.max(0) as usize)
    }

    /// Run a `MATCH ... RETURN` write and map "no row" to NotFound.
    async fn require_match(
        &self,
        q: neo4rs::Query,
        label: &'static str,
        id: String,
    ) -> Result<(), GraphError> {
        match self.query_one(q).await? {
            Some(_) => Ok(()),
            None => Err(GraphError::NotFound { label, id }),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn opt_string(opt: &Option<String>) -> String {
    opt.clone().unwrap_or_default()
}
