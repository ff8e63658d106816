//! Core domain types for LAN Watch.
//!
//! These types describe monitored networks, inventory hosts, and the
//! observations the discovery engine produces about them.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

/// Unique identifier for an inventory host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub Uuid);

impl HostId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a monitored network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub Uuid);

impl NetworkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Inventory ─────────────────────────────────────────────────────

/// Reachability of a host as last observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
}

impl HostStatus {
    pub fn is_online(self) -> bool {
        self == Self::Online
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    /// Parse the stored string form; anything unrecognized is offline.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("online") {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host tracked in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: HostId,
    pub ip: String,
    pub name: Option<String>,
    pub status: HostStatus,
    /// Optional service URL checked before ICMP/TCP probing.
    pub url: Option<String>,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub first_seen: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// A subnet registered for discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoredNetwork {
    pub id: NetworkId,
    pub name: Option<String>,
    pub network_address: Ipv4Addr,
    pub prefix_length: u8,
    pub auto_scan_enabled: bool,
    pub auto_scan_interval_ms: u64,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

impl MonitoredNetwork {
    /// Default recurring-scan interval: five minutes.
    pub const DEFAULT_INTERVAL_MS: u64 = 300_000;

    pub fn new(network_address: Ipv4Addr, prefix_length: u8) -> Self {
        Self {
            id: NetworkId::new(),
            name: None,
            network_address,
            prefix_length,
            auto_scan_enabled: false,
            auto_scan_interval_ms: Self::DEFAULT_INTERVAL_MS,
            last_scanned_at: None,
        }
    }

    /// CIDR notation, e.g. `192.168.1.0/24`.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.network_address, self.prefix_length)
    }
}

// ── Probing ───────────────────────────────────────────────────────

/// Which probe layer proved a host reachable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    Url,
    Echo,
    Port,
}

/// Outcome of one layered probe against a single address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub address: String,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    pub via_port: Option<u16>,
    pub method: Option<ProbeMethod>,
    /// False when `packet_loss_pct` is a placeholder rather than a measurement
    /// (TCP fallback path, or an unreachable host).
    pub measured_loss: bool,
}

impl ProbeResult {
    /// The result reported for unreachable or unprobeable addresses.
    pub fn unreachable(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reachable: false,
            latency_ms: None,
            packet_loss_pct: Some(100.0),
            via_port: None,
            method: None,
            measured_loss: false,
        }
    }

    pub fn status(&self) -> HostStatus {
        if self.reachable {
            HostStatus::Online
        } else {
            HostStatus::Offline
        }
    }

    pub fn to_check(&self) -> HostCheck {
        HostCheck {
            status: self.status(),
            latency_ms: self.latency_ms,
            packet_loss_pct: self.packet_loss_pct,
        }
    }
}

/// The caller-facing summary of a host check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HostCheck {
    pub status: HostStatus,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
}

/// A live address found by a sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredHost {
    pub ip: Ipv4Addr,
    pub name: Option<String>,
    pub via_port: Option<u16>,
    pub latency_ms: Option<f64>,
}

// ── History ───────────────────────────────────────────────────────

/// One timestamped observation of a host's reachability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivenessRecord {
    pub host_id: HostId,
    pub status: HostStatus,
    pub observed_at: DateTime<Utc>,
    pub latency_ms: Option<f64>,
}
