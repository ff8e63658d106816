//! Reconciliation: apply a sweep's live set to the inventory.
//!
//! - live, not in inventory: create the host Online, record `NewDevice`
//! - in inventory and live: refresh latency, loss, and last-checked
//! - in inventory, previously Online, now absent: mark Offline, record `Disconnected`
//!
//! Absence counts only for addresses the sweep finished probing. After a
//! deadline-cut sweep, unprobed hosts are left untouched.
//!
//! Every other inventory host in the network gets one liveness record per
//! pass. A failure on one host is logged and counted; the pass continues.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use lanwatch_core::{
    DiscoveredHost, DiscoveryKind, Host, HostFields, HostStatus, InventoryStore, MonitoredNetwork,
};
use lanwatch_history::HistoryStore;

use crate::error::Result;
use crate::sweep::SweepOutcome;

/// Loss recorded for sweep-detected hosts; a TCP connect doesn't measure it.
const SWEEP_LOSS_PCT: f64 = 100.0;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub live_count: u32,
    pub new_count: u32,
    pub updated_count: u32,
    pub disconnected_count: u32,
    /// Absent hosts left alone because the sweep never finished probing them.
    pub unprobed_count: u32,
    /// Hosts whose update failed in the store.
    pub failed_count: u32,
}

/// Apply a sweep's outcome to the inventory hosts of `network`.
///
/// Fails only when the current inventory can't be listed.
pub async fn reconcile(
    inventory: &dyn InventoryStore,
    history: &dyn HistoryStore,
    network: &MonitoredNetwork,
    outcome: &SweepOutcome,
) -> Result<ReconcileSummary> {
    let live = outcome.hosts.as_slice();
    let known: HashMap<Ipv4Addr, Host> = inventory
        .list_hosts_in_network(network.network_address, network.prefix_length)
        .await?
        .into_iter()
        .filter_map(|h| h.ip.parse().ok().map(|ip| (ip, h)))
        .collect();

    let mut summary = ReconcileSummary {
        live_count: live.len() as u32,
        ..Default::default()
    };
    let mut seen: HashSet<Ipv4Addr> = HashSet::with_capacity(live.len());

    for found in live {
        seen.insert(found.ip);
        let outcome = match known.get(&found.ip) {
            Some(host) => refresh_host(inventory, history, host, found).await,
            None => add_host(inventory, history, network, found).await,
        };
        match outcome {
            Ok(true) => summary.new_count += 1,
            Ok(false) => summary.updated_count += 1,
            Err(e) => {
                summary.failed_count += 1;
                tracing::warn!(ip = %found.ip, network_id = %network.id, error = %e, "Failed to record live host");
            }
        }
    }

    for (ip, host) in known.iter().filter(|(ip, _)| !seen.contains(ip)) {
        if !outcome.confirms_absent(*ip) {
            summary.unprobed_count += 1;
            continue;
        }
        match mark_absent(inventory, history, network, host).await {
            Ok(true) => summary.disconnected_count += 1,
            Ok(false) => {}
            Err(e) => {
                summary.failed_count += 1;
                tracing::warn!(ip = %ip, network_id = %network.id, error = %e, "Failed to record absent host");
            }
        }
    }

    tracing::info!(
        network_id = %network.id,
        cidr = %network.cidr(),
        live = summary.live_count,
        new = summary.new_count,
        updated = summary.updated_count,
        disconnected = summary.disconnected_count,
        unprobed = summary.unprobed_count,
        partial = outcome.partial,
        failed = summary.failed_count,
        "Reconciliation complete"
    );
    Ok(summary)
}

/// Returns `Ok(true)` since the host is new.
async fn add_host(
    inventory: &dyn InventoryStore,
    history: &dyn HistoryStore,
    network: &MonitoredNetwork,
    found: &DiscoveredHost,
) -> Result<bool> {
    let host = inventory
        .upsert_host(
            found.ip,
            HostFields {
                name: found.name.clone(),
                status: Some(HostStatus::Online),
                latency_ms: found.latency_ms,
                packet_loss_pct: Some(SWEEP_LOSS_PCT),
                url: None,
            },
        )
        .await?;
    inventory
        .record_discovery_event(&network.id, DiscoveryKind::NewDevice, &host.id)
        .await?;
    history.append(host.id, HostStatus::Online, found.latency_ms)?;

    tracing::info!(ip = %found.ip, host_id = %host.id, name = ?found.name, "New device discovered");
    Ok(true)
}

async fn refresh_host(
    inventory: &dyn InventoryStore,
    history: &dyn HistoryStore,
    host: &Host,
    found: &DiscoveredHost,
) -> Result<bool> {
    inventory
        .set_host_status(
            &host.id,
            HostStatus::Online,
            found.latency_ms,
            Some(SWEEP_LOSS_PCT),
        )
        .await?;
    if host.name.is_none() && found.name.is_some() {
        inventory
            .upsert_host(
                found.ip,
                HostFields {
                    name: found.name.clone(),
                    ..Default::default()
                },
            )
            .await?;
    }
    history.append(host.id, HostStatus::Online, found.latency_ms)?;
    Ok(false)
}

/// Returns `Ok(true)` when the host went from Online to Offline.
async fn mark_absent(
    inventory: &dyn InventoryStore,
    history: &dyn HistoryStore,
    network: &MonitoredNetwork,
    host: &Host,
) -> Result<bool> {
    let was_online = host.status.is_online();
    if was_online {
        inventory
            .set_host_status(&host.id, HostStatus::Offline, None, Some(100.0))
            .await?;
        inventory
            .record_discovery_event(&network.id, DiscoveryKind::Disconnected, &host.id)
            .await?;
        tracing::info!(ip = %host.ip, host_id = %host.id, "Device disconnected");
    }
    history.append(host.id, HostStatus::Offline, None)?;
    Ok(was_online)
}
