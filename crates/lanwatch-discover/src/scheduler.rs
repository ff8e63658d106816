//! Recurring scan scheduling.
//!
//! The scheduler owns one tokio task per enabled network. Each task ticks at
//! the network's interval and runs a sweep-and-reconcile cycle. A failing
//! cycle is logged and the schedule continues. At most one timer exists per
//! network: enabling again replaces it.
//!
//! Enable, disable, and restore of one network are serialized, so the timer
//! state always matches the last call to finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use lanwatch_core::{AddressRange, NetworkId};

use crate::error::{DiscoverError, Result};
use crate::monitor::NetworkMonitor;
use crate::sweep::sweep_targets;

pub struct ScanScheduler {
    monitor: Arc<NetworkMonitor>,
    default_interval_ms: u64,
    timers: Mutex<HashMap<NetworkId, JoinHandle<()>>>,
    toggles: Mutex<HashMap<NetworkId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ScanScheduler {
    pub fn new(monitor: Arc<NetworkMonitor>, default_interval_ms: u64) -> Self {
        Self {
            monitor,
            default_interval_ms: default_interval_ms.max(1),
            timers: Mutex::new(HashMap::new()),
            toggles: Mutex::new(HashMap::new()),
        }
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Turn auto-scan on or off for a network.
    pub async fn set_auto_scan(
        &self,
        network_id: &NetworkId,
        enabled: bool,
        interval_ms: Option<u64>,
    ) -> Result<()> {
        if enabled {
            self.enable(network_id, interval_ms).await
        } else {
            self.disable(network_id).await
        }
    }

    /// Persist the setting, sweep once now, then arm the recurring timer.
    ///
    /// An unsweepable network fails here, before anything is armed.
    pub async fn enable(&self, network_id: &NetworkId, interval_ms: Option<u64>) -> Result<()> {
        let interval_ms = interval_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.default_interval_ms);

        let toggle = self.toggle(*network_id);
        let _held = toggle.lock().await;
        self.cancel(network_id);

        let network = self
            .monitor
            .inventory()
            .get_monitored_network(network_id)
            .await?
            .ok_or(DiscoverError::NetworkNotFound(*network_id))?;
        sweep_targets(&AddressRange::cidr(
            network.network_address,
            network.prefix_length,
        )?)?;

        self.monitor
            .inventory()
            .update_network_auto_scan(network_id, true, interval_ms)
            .await?;

        if let Err(e) = self.monitor.run_cycle(network_id).await {
            tracing::error!(network_id = %network_id, error = %e, "Initial sweep failed");
        }

        let period = Duration::from_millis(interval_ms);
        self.arm(*network_id, Instant::now() + period, period);
        tracing::info!(
            network_id = %network_id,
            cidr = %network.cidr(),
            interval_ms,
            "Auto-scan enabled"
        );
        Ok(())
    }

    /// Cancel the timer and persist auto-scan off. A no-op when not enabled.
    pub async fn disable(&self, network_id: &NetworkId) -> Result<()> {
        let toggle = self.toggle(*network_id);
        let _held = toggle.lock().await;
        let was_active = self.cancel(network_id);

        let inventory = self.monitor.inventory();
        if let Some(network) = inventory.get_monitored_network(network_id).await? {
            if network.auto_scan_enabled {
                inventory
                    .update_network_auto_scan(network_id, false, network.auto_scan_interval_ms)
                    .await?;
            }
        }

        if was_active {
            tracing::info!(network_id = %network_id, "Auto-scan disabled");
        }
        Ok(())
    }

    /// Re-arm every network stored with auto-scan enabled.
    /// The first cycle of each runs immediately in the background.
    pub async fn restore(&self) -> Result<usize> {
        let networks = self.monitor.inventory().list_monitored_networks().await?;
        let mut restored = 0;

        for network in networks.iter().filter(|n| n.auto_scan_enabled) {
            let toggle = self.toggle(network.id);
            let _held = toggle.lock().await;
            let period = Duration::from_millis(if network.auto_scan_interval_ms == 0 {
                self.default_interval_ms
            } else {
                network.auto_scan_interval_ms
            });
            self.arm(network.id, Instant::now(), period);
            restored += 1;
        }

        tracing::info!(restored, "Scheduler restored");
        Ok(restored)
    }

    /// Networks with an armed timer, sorted.
    pub fn active_networks(&self) -> Vec<NetworkId> {
        let mut ids: Vec<_> = self.timers().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_active(&self, network_id: &NetworkId) -> bool {
        self.timers().contains_key(network_id)
    }

    /// Cancel every timer.
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        let count = timers.len();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        tracing::info!(cancelled = count, "Scheduler shut down");
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, HashMap<NetworkId, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn toggle(&self, network_id: NetworkId) -> Arc<tokio::sync::Mutex<()>> {
        let mut toggles = self.toggles.lock().unwrap_or_else(|p| p.into_inner());
        toggles.entry(network_id).or_default().clone()
    }

    /// Returns whether a timer was running.
    fn cancel(&self, network_id: &NetworkId) -> bool {
        match self.timers().remove(network_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn arm(&self, network_id: NetworkId, first: Instant, period: Duration) {
        let monitor = self.monitor.clone();
        let handle = tokio::spawn(run_network_loop(monitor, network_id, first, period));
        if let Some(previous) = self.timers().insert(network_id, handle) {
            previous.abort();
        }
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers().drain() {
            handle.abort();
        }
    }
}

/// Per-network tick loop.
async fn run_network_loop(
    monitor: Arc<NetworkMonitor>,
    network_id: NetworkId,
    first: Instant,
    period: Duration,
) {
    let mut ticker = interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        tracing::debug!(network_id = %network_id, "Scheduled sweep triggered");

        match monitor.run_cycle(&network_id).await {
            Ok(Some(summary)) => tracing::debug!(
                network_id = %network_id,
                live = summary.live_count,
                "Scheduled sweep complete"
            ),
            Ok(None) => {}
            Err(e) => tracing::error!(
                network_id = %network_id,
                error = %e,
                transient = e.is_transient(),
                "Scheduled sweep failed"
            ),
        }
    }
}
