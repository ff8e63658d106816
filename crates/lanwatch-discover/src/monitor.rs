//! The discovery engine's entry points: manual checks, manual sweeps,
//! scheduled sweep cycles, uptime, and event management.
//!
//! No two sweeps of the same network run at once. Manual sweeps wait for an
//! in-flight sweep; scheduled cycles skip instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;

use lanwatch_core::{
    AddressRange, DiscoveredHost, DiscoveryEvent, Host, HostId, InventoryStore, MonitoredNetwork,
    NetworkId, ProbeResult,
};
use lanwatch_history::{HistoryStore, DEFAULT_UPTIME_WINDOW};

use crate::config::SweepConfig;
use crate::error::{DiscoverError, Result};
use crate::probe::LivenessProbe;
use crate::reconcile::{reconcile, ReconcileSummary};
use crate::sweep::{NetworkSweeper, SweepOptions, SweepOutcome};

/// Options for an operator-triggered sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualSweep {
    /// Deadline for the sweep; the configured manual deadline when `None`.
    pub timeout: Option<Duration>,
    /// Reconcile the live set into the inventory.
    pub add_hosts: bool,
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub hosts: Vec<DiscoveredHost>,
    /// The deadline expired before every address was probed.
    pub partial: bool,
    /// Hosts newly created in the inventory.
    pub added_count: u32,
    pub summary: Option<ReconcileSummary>,
}

pub struct NetworkMonitor {
    inventory: Arc<dyn InventoryStore>,
    history: Arc<dyn HistoryStore>,
    probe: Arc<LivenessProbe>,
    sweeper: NetworkSweeper,
    sweep_options: SweepOptions,
    manual_deadline: Duration,
    guards: Mutex<HashMap<NetworkId, Arc<tokio::sync::Mutex<()>>>>,
}

impl NetworkMonitor {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        history: Arc<dyn HistoryStore>,
        probe: Arc<LivenessProbe>,
        sweeper: NetworkSweeper,
        sweep: &SweepConfig,
    ) -> Self {
        Self {
            inventory,
            history,
            probe,
            sweeper,
            sweep_options: SweepOptions::from_config(sweep),
            manual_deadline: sweep.manual_deadline(),
            guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn inventory(&self) -> &Arc<dyn InventoryStore> {
        &self.inventory
    }

    fn guard(&self, network_id: NetworkId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = self.guards.lock().unwrap_or_else(|p| p.into_inner());
        guards.entry(network_id).or_default().clone()
    }

    async fn network(&self, network_id: &NetworkId) -> Result<MonitoredNetwork> {
        self.inventory
            .get_monitored_network(network_id)
            .await?
            .ok_or(DiscoverError::NetworkNotFound(*network_id))
    }

    // ── Checks ───────────────────────────────────────────────────

    /// Probe one inventory host now and record the outcome.
    ///
    /// Store failures while recording are logged; the probe result is
    /// still returned.
    pub async fn check_host(&self, host_id: &HostId) -> Result<ProbeResult> {
        let host = self
            .inventory
            .get_host(host_id)
            .await?
            .ok_or(DiscoverError::HostNotFound(*host_id))?;

        Ok(check_and_record(&self.probe, &self.inventory, &self.history, &host).await)
    }

    /// Probe every inventory host in a network concurrently.
    pub async fn check_network_hosts(&self, network_id: &NetworkId) -> Result<Vec<ProbeResult>> {
        let network = self.network(network_id).await?;
        let hosts = self
            .inventory
            .list_hosts_in_network(network.network_address, network.prefix_length)
            .await?;

        let mut set = JoinSet::new();
        for host in hosts {
            let probe = self.probe.clone();
            let inventory = self.inventory.clone();
            let history = self.history.clone();
            set.spawn(async move { check_and_record(&probe, &inventory, &history, &host).await });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(network_id = %network_id, error = %e, "Host check task failed"),
            }
        }
        results.sort_by_key(|r| r.address.parse::<std::net::Ipv4Addr>().ok());

        tracing::info!(
            network_id = %network_id,
            checked = results.len(),
            online = results.iter().filter(|r| r.reachable).count(),
            "Network host check complete"
        );
        Ok(results)
    }

    // ── Sweeps ───────────────────────────────────────────────────

    /// Operator-triggered sweep. Waits if a sweep of this network is running.
    pub async fn sweep_network(
        &self,
        network_id: &NetworkId,
        request: ManualSweep,
    ) -> Result<SweepReport> {
        let network = self.network(network_id).await?;
        let range = AddressRange::cidr(network.network_address, network.prefix_length)?;
        let options = self
            .sweep_options
            .clone()
            .with_deadline(request.timeout.unwrap_or(self.manual_deadline));

        let guard = self.guard(*network_id);
        let _held = guard.lock().await;

        let outcome = self.sweeper.sweep_outcome(&range, &options).await?;
        if !request.add_hosts {
            return Ok(SweepReport {
                partial: outcome.partial,
                hosts: outcome.hosts,
                added_count: 0,
                summary: None,
            });
        }

        let summary = self.reconcile_and_stamp(&network, &outcome).await?;
        Ok(SweepReport {
            partial: outcome.partial,
            hosts: outcome.hosts,
            added_count: summary.new_count,
            summary: Some(summary),
        })
    }

    /// One scheduled sweep-and-reconcile.
    ///
    /// Returns `Ok(None)` without doing anything when a sweep of this
    /// network is already in flight.
    pub async fn run_cycle(&self, network_id: &NetworkId) -> Result<Option<ReconcileSummary>> {
        let guard = self.guard(*network_id);
        let Ok(_held) = guard.try_lock() else {
            tracing::info!(network_id = %network_id, "Sweep already in flight, skipping tick");
            return Ok(None);
        };

        let network = self.network(network_id).await?;
        let range = AddressRange::cidr(network.network_address, network.prefix_length)?;
        let outcome = self.sweeper.sweep_outcome(&range, &self.sweep_options).await?;
        let summary = self.reconcile_and_stamp(&network, &outcome).await?;
        Ok(Some(summary))
    }

    /// Reconcile, then stamp `last_scanned_at` whether or not reconciliation
    /// succeeded.
    async fn reconcile_and_stamp(
        &self,
        network: &MonitoredNetwork,
        sweep: &SweepOutcome,
    ) -> Result<ReconcileSummary> {
        let outcome = reconcile(
            self.inventory.as_ref(),
            self.history.as_ref(),
            network,
            sweep,
        )
        .await;
        self.inventory
            .update_network_last_scanned(&network.id, Utc::now())
            .await?;
        outcome
    }

    // ── Uptime and events ────────────────────────────────────────

    /// Rolling uptime over the default 24-hour window.
    pub fn uptime(&self, host_id: &HostId) -> Result<f64> {
        self.uptime_over(host_id, DEFAULT_UPTIME_WINDOW)
    }

    pub fn uptime_over(&self, host_id: &HostId, window: Duration) -> Result<f64> {
        Ok(self.history.rolling_uptime(*host_id, window)?)
    }

    pub async fn list_events(&self, network_id: &NetworkId) -> Result<Vec<DiscoveryEvent>> {
        Ok(self.inventory.list_discovery_events(network_id).await?)
    }

    pub async fn clear_events(&self, network_id: &NetworkId) -> Result<usize> {
        let removed = self.inventory.clear_discovery_events(network_id).await?;
        tracing::info!(network_id = %network_id, removed, "Discovery events cleared");
        Ok(removed)
    }
}

async fn check_and_record(
    probe: &LivenessProbe,
    inventory: &Arc<dyn InventoryStore>,
    history: &Arc<dyn HistoryStore>,
    host: &Host,
) -> ProbeResult {
    let result = probe.probe(&host.ip, host.url.as_deref()).await;
    let status = result.status();

    if let Err(e) = inventory
        .set_host_status(&host.id, status, result.latency_ms, result.packet_loss_pct)
        .await
    {
        tracing::warn!(host_id = %host.id, error = %e, "Failed to store host status");
    }
    if let Err(e) = history.append(host.id, status, result.latency_ms) {
        tracing::warn!(host_id = %host.id, error = %e, "Failed to append liveness record");
    }

    tracing::debug!(host_id = %host.id, ip = %host.ip, status = %status, "Host checked");
    result
}
