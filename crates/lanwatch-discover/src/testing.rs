//! In-crate fakes for deterministic probe, sweep, and scheduler tests.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lanwatch_core::inventory::Result as InventoryResult;
use lanwatch_core::{
    DiscoveryEvent, DiscoveryKind, Host, HostFields, HostId, HostStatus, InventoryError,
    InventoryStore, MemoryInventory, MonitoredNetwork, NetworkId,
};

use lanwatch_history::MemoryHistoryStore;

use crate::config::{ProbeConfig, SweepConfig};
use crate::connect::{Connector, Probe};
use crate::echo::{EchoOutcome, Pinger};
use crate::http::{UrlChecker, UrlOutcome};
use crate::monitor::NetworkMonitor;
use crate::probe::LivenessProbe;
use crate::resolve::NameResolver;
use crate::sweep::NetworkSweeper;

// ── Connector ────────────────────────────────────────────────────

/// Succeeds on registered `(ip, port)` pairs, times out elsewhere.
///
/// Every attempt sleeps for `delay` first, so tests on a paused clock can
/// observe in-flight sweeps.
#[derive(Clone, Default)]
pub struct FakeConnector {
    open: HashSet<SocketAddrV4>,
    delay: Duration,
    attempts: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(mut self, ip: Ipv4Addr, port: u16) -> Self {
        self.open.insert(SocketAddrV4::new(ip, port));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Most connects ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, addr: SocketAddrV4, timeout: Duration) -> Probe {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if self.open.contains(&addr) {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Probe::Success {
                port: addr.port(),
                latency_ms: 1.0,
            }
        } else {
            tokio::time::sleep(self.delay.max(timeout.min(Duration::from_millis(5)))).await;
            Probe::Timeout
        }
    }
}

// ── Pinger ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakePinger {
    replies: HashMap<Ipv4Addr, f64>,
    calls: Arc<AtomicUsize>,
}

impl FakePinger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, ip: Ipv4Addr, latency_ms: f64) -> Self {
        self.replies.insert(ip, latency_ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pinger for FakePinger {
    async fn echo(&self, ip: Ipv4Addr, _timeout: Duration) -> EchoOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(&ip) {
            Some(&latency) => EchoOutcome::Reply {
                latency_ms: Some(latency),
                packet_loss_pct: 0.0,
            },
            None => EchoOutcome::NoReply,
        }
    }
}

// ── URL checker ──────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeUrlChecker {
    outcomes: HashMap<String, UrlOutcome>,
}

impl FakeUrlChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reachable(mut self, url: &str, status: u16) -> Self {
        self.outcomes.insert(
            url.to_string(),
            UrlOutcome::Reachable {
                status,
                latency_ms: 12.0,
            },
        );
        self
    }

    pub fn server_error(mut self, url: &str, status: u16) -> Self {
        self.outcomes
            .insert(url.to_string(), UrlOutcome::ServerError { status });
        self
    }
}

#[async_trait]
impl UrlChecker for FakeUrlChecker {
    async fn check(&self, url: &str, _timeout: Duration) -> UrlOutcome {
        self.outcomes
            .get(url)
            .cloned()
            .unwrap_or_else(|| UrlOutcome::Failed("connection refused".to_string()))
    }
}

// ── Resolver ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeResolver {
    names: HashMap<Ipv4Addr, String>,
    hang: HashSet<Ipv4Addr>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, ip: Ipv4Addr, name: &str) -> Self {
        self.names.insert(ip, name.to_string());
        self
    }

    /// Lookups for `ip` never complete.
    pub fn hang(mut self, ip: Ipv4Addr) -> Self {
        self.hang.insert(ip);
        self
    }
}

#[async_trait]
impl NameResolver for FakeResolver {
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        if self.hang.contains(&ip) {
            std::future::pending::<()>().await;
        }
        self.names.get(&ip).cloned()
    }
}

// ── Inventory ────────────────────────────────────────────────────

/// `MemoryInventory` that counts scan stamps and can simulate an outage.
#[derive(Default)]
pub struct CountingInventory {
    inner: MemoryInventory,
    last_scanned_writes: AtomicUsize,
    unavailable: AtomicBool,
}

impl CountingInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_scanned_writes(&self) -> usize {
        self.last_scanned_writes.load(Ordering::SeqCst)
    }

    /// While set, host listings fail as a transient outage.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryStore for CountingInventory {
    async fn get_monitored_network(&self, id: &NetworkId) -> InventoryResult<Option<MonitoredNetwork>> {
        self.inner.get_monitored_network(id).await
    }

    async fn list_monitored_networks(&self) -> InventoryResult<Vec<MonitoredNetwork>> {
        self.inner.list_monitored_networks().await
    }

    async fn upsert_monitored_network(&self, network: &MonitoredNetwork) -> InventoryResult<()> {
        self.inner.upsert_monitored_network(network).await
    }

    async fn update_network_auto_scan(
        &self,
        id: &NetworkId,
        enabled: bool,
        interval_ms: u64,
    ) -> InventoryResult<()> {
        self.inner.update_network_auto_scan(id, enabled, interval_ms).await
    }

    async fn update_network_last_scanned(&self, id: &NetworkId, at: DateTime<Utc>) -> InventoryResult<()> {
        self.last_scanned_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_network_last_scanned(id, at).await
    }

    async fn get_host(&self, id: &HostId) -> InventoryResult<Option<Host>> {
        self.inner.get_host(id).await
    }

    async fn find_host_by_ip(&self, ip: Ipv4Addr) -> InventoryResult<Option<Host>> {
        self.inner.find_host_by_ip(ip).await
    }

    async fn list_hosts_in_network(
        &self,
        network_address: Ipv4Addr,
        prefix_length: u8,
    ) -> InventoryResult<Vec<Host>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(InventoryError::Unavailable("simulated outage".to_string()));
        }
        self.inner
            .list_hosts_in_network(network_address, prefix_length)
            .await
    }

    async fn upsert_host(&self, ip: Ipv4Addr, fields: HostFields) -> InventoryResult<Host> {
        self.inner.upsert_host(ip, fields).await
    }

    async fn set_host_status(
        &self,
        id: &HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
        packet_loss_pct: Option<f64>,
    ) -> InventoryResult<()> {
        self.inner
            .set_host_status(id, status, latency_ms, packet_loss_pct)
            .await
    }

    async fn record_discovery_event(
        &self,
        network_id: &NetworkId,
        kind: DiscoveryKind,
        host_id: &HostId,
    ) -> InventoryResult<DiscoveryEvent> {
        self.inner
            .record_discovery_event(network_id, kind, host_id)
            .await
    }

    async fn list_discovery_events(&self, network_id: &NetworkId) -> InventoryResult<Vec<DiscoveryEvent>> {
        self.inner.list_discovery_events(network_id).await
    }

    async fn clear_discovery_events(&self, network_id: &NetworkId) -> InventoryResult<usize> {
        self.inner.clear_discovery_events(network_id).await
    }
}

// ── Wiring ───────────────────────────────────────────────────────

/// A monitor over `inventory` with fake probe layers and in-memory history.
pub fn monitor_with(
    inventory: Arc<CountingInventory>,
    pinger: FakePinger,
    connector: FakeConnector,
) -> NetworkMonitor {
    let probe = LivenessProbe::new(
        ProbeConfig::default(),
        Arc::new(FakeUrlChecker::new()),
        Arc::new(pinger),
        Arc::new(connector.clone()),
    );
    let sweeper = NetworkSweeper::new(
        Arc::new(connector),
        Arc::new(FakeResolver::new()),
        inventory.clone(),
    );
    NetworkMonitor::new(
        inventory,
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(probe),
        sweeper,
        &SweepConfig::default(),
    )
}
