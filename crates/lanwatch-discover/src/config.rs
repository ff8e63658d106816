//! Configuration for the lanwatch-discover engine.

use std::time::Duration;

use serde::Deserialize;

use lanwatch_core::range::parse_descriptor;
use lanwatch_core::{AddressRange, MonitoredNetwork};

use crate::error::{DiscoverError, Result};

/// Upper bound on the per-port connect timeout during sweeps.
pub const MAX_SWEEP_PORT_TIMEOUT_MS: u64 = 1500;

/// Top-level discover configuration.
///
/// Loaded from `lanwatch.toml` `[discover]` section or
/// `LANWATCH_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Networks upserted into the inventory at start-up.
    #[serde(default)]
    pub networks: Vec<NetworkSeed>,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    /// Directory for per-host liveness ledgers. In-memory when unset.
    #[serde(default)]
    pub history_dir: Option<String>,

    /// Recurring-scan interval used when a network doesn't set one.
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
}

/// A network declared in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSeed {
    /// CIDR (e.g. "192.168.1.0/24") or range ("192.168.1.1-254").
    pub cidr: String,

    pub name: Option<String>,

    #[serde(default)]
    pub auto_scan: bool,

    pub interval_ms: Option<u64>,
}

/// Layered probe settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_url_timeout_ms")]
    pub url_timeout_ms: u64,

    #[serde(default = "default_echo_timeout_ms")]
    pub echo_timeout_ms: u64,

    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// TCP ports tried in parallel when echo gets no reply.
    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<u16>,

    /// Path to the system ping binary.
    #[serde(default = "default_ping_path")]
    pub ping_path: String,
}

/// Subnet sweep settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_quick_ports")]
    pub quick_ports: Vec<u16>,

    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    /// Deadline applied to manual sweeps that don't supply one.
    #[serde(default = "default_manual_deadline_ms")]
    pub manual_deadline_ms: u64,
}

impl DiscoverConfig {
    /// Load the `[discover]` section from `{file_prefix}.toml` (optional)
    /// layered under `LANWATCH_DISCOVER__*` environment variables.
    ///
    /// A missing or unreadable section falls back to defaults; a source
    /// that fails to build is an error.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = ::config::Config::builder()
            .add_source(::config::File::with_name(file_prefix).required(false))
            .add_source(
                ::config::Environment::with_prefix("LANWATCH_DISCOVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DiscoverError::Config(e.to_string()))?;

        match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => Ok(c),
            Err(e) => {
                tracing::debug!(error = %e, "No usable [discover] section, using defaults");
                Ok(DiscoverConfig::default())
            }
        }
    }
}

impl NetworkSeed {
    /// The inventory network this seed describes. A span maps to the /24
    /// that holds it.
    pub fn to_network(&self) -> Result<MonitoredNetwork> {
        let range: AddressRange = parse_descriptor(&self.cidr)?;
        let (address, prefix) = range.covering_network();
        let mut network = MonitoredNetwork::new(address, prefix);
        network.name = self.name.clone();
        network.auto_scan_enabled = self.auto_scan;
        if let Some(ms) = self.interval_ms {
            network.auto_scan_interval_ms = ms;
        }
        Ok(network)
    }
}

impl ProbeConfig {
    pub fn url_timeout(&self) -> Duration {
        Duration::from_millis(self.url_timeout_ms)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }
}

impl SweepConfig {
    /// Per-port timeout, capped at [`MAX_SWEEP_PORT_TIMEOUT_MS`].
    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms.min(MAX_SWEEP_PORT_TIMEOUT_MS))
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn manual_deadline(&self) -> Duration {
        Duration::from_millis(self.manual_deadline_ms)
    }
}

fn default_interval_ms() -> u64 {
    MonitoredNetwork::DEFAULT_INTERVAL_MS
}

fn default_url_timeout_ms() -> u64 {
    5000
}

fn default_echo_timeout_ms() -> u64 {
    3000
}

fn default_port_timeout_ms() -> u64 {
    1500
}

fn default_fallback_ports() -> Vec<u16> {
    vec![22, 80, 443, 3389, 8080, 8006]
}

fn default_ping_path() -> String {
    "ping".to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_quick_ports() -> Vec<u16> {
    vec![22, 80, 443]
}

fn default_resolve_timeout_ms() -> u64 {
    5000
}

fn default_manual_deadline_ms() -> u64 {
    120_000
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            networks: Vec::new(),
            probe: ProbeConfig::default(),
            sweep: SweepConfig::default(),
            history_dir: None,
            default_interval_ms: default_interval_ms(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url_timeout_ms: default_url_timeout_ms(),
            echo_timeout_ms: default_echo_timeout_ms(),
            port_timeout_ms: default_port_timeout_ms(),
            fallback_ports: default_fallback_ports(),
            ping_path: default_ping_path(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            quick_ports: default_quick_ports(),
            port_timeout_ms: default_port_timeout_ms(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            manual_deadline_ms: default_manual_deadline_ms(),
        }
    }
}
