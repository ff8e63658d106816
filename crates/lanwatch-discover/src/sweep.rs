//! Subnet sweeps: find the live addresses in a range, then name them.
//!
//! Addresses are probed in fixed-size batches, one batch at a time. Inside a
//! batch every address races the quick ports concurrently, so at most
//! `batch_size × ports.len()` sockets are ever open. Per-address failures
//! only exclude that address. A deadline cuts the sweep short and returns
//! whatever was found so far, marked partial.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};

use lanwatch_core::range::{MAX_SWEEP_PREFIX, MIN_SWEEP_PREFIX};
use lanwatch_core::{AddressRange, DiscoveredHost, InventoryStore, RangeError};

use crate::config::SweepConfig;
use crate::connect::{first_open_port, Connector};
use crate::error::Result;
use crate::resolve::{short_name, NameResolver};

/// Batch-level progress published during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepProgress {
    /// 1-based index of the batch just finished.
    pub batch: usize,
    pub batches: usize,
    /// Addresses probed so far.
    pub probed: usize,
    /// Live addresses found so far.
    pub live: usize,
}

/// Result of one sweep.
///
/// Only addresses in `probed` finished their port race. When `partial` is
/// set, an address missing from `hosts` is unknown rather than down.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub hosts: Vec<DiscoveredHost>,
    pub probed: HashSet<Ipv4Addr>,
    pub partial: bool,
}

impl SweepOutcome {
    /// A finished sweep where every target was probed.
    pub fn complete(hosts: Vec<DiscoveredHost>) -> Self {
        let probed = hosts.iter().map(|h| h.ip).collect();
        Self {
            hosts,
            probed,
            partial: false,
        }
    }

    /// Whether absence from `hosts` proves `ip` is down.
    pub fn confirms_absent(&self, ip: Ipv4Addr) -> bool {
        !self.partial || self.probed.contains(&ip)
    }
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub batch_size: usize,
    pub ports: Vec<u16>,
    pub port_timeout: Duration,
    pub resolve_timeout: Duration,
    /// Relative deadline for the whole sweep, name pass included.
    pub deadline: Option<Duration>,
    pub progress: Option<mpsc::UnboundedSender<SweepProgress>>,
}

impl SweepOptions {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            ports: config.quick_ports.clone(),
            port_timeout: config.port_timeout(),
            resolve_timeout: config.resolve_timeout(),
            deadline: None,
            progress: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<SweepProgress>) -> Self {
        self.progress = Some(tx);
        self
    }
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self::from_config(&SweepConfig::default())
    }
}

pub struct NetworkSweeper {
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn NameResolver>,
    inventory: Arc<dyn InventoryStore>,
}

impl NetworkSweeper {
    pub fn new(
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn NameResolver>,
        inventory: Arc<dyn InventoryStore>,
    ) -> Self {
        Self {
            connector,
            resolver,
            inventory,
        }
    }

    /// Live hosts in `range`, ordered by address.
    ///
    /// Fails only on an unsweepable range, before any I/O.
    pub async fn sweep(
        &self,
        range: &AddressRange,
        options: &SweepOptions,
    ) -> Result<Vec<DiscoveredHost>> {
        Ok(self.sweep_outcome(range, options).await?.hosts)
    }

    /// Like [`sweep`](Self::sweep), also reporting which addresses were
    /// probed and whether the deadline cut the sweep short.
    pub async fn sweep_outcome(
        &self,
        range: &AddressRange,
        options: &SweepOptions,
    ) -> Result<SweepOutcome> {
        let addresses = sweep_targets(range)?;
        let started = Instant::now();
        let deadline = options.deadline.map(|d| started + d);
        let batch_size = options.batch_size.max(1);
        let batches = addresses.len().div_ceil(batch_size);
        let ports: Arc<[u16]> = options.ports.clone().into();

        tracing::info!(
            range = %range,
            addresses = addresses.len(),
            batches,
            "Sweep started"
        );

        let mut live = Vec::new();
        let mut done: HashSet<Ipv4Addr> = HashSet::with_capacity(addresses.len());
        let mut expired = false;

        for (index, chunk) in addresses.chunks(batch_size).enumerate() {
            let mut set = JoinSet::new();
            for &ip in chunk {
                let connector = self.connector.clone();
                let ports = ports.clone();
                let limit = options.port_timeout;
                set.spawn(async move { (ip, first_open_port(connector, ip, &ports, limit).await) });
            }

            loop {
                let next = match deadline {
                    Some(at) => match timeout_at(at, set.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            expired = true;
                            break;
                        }
                    },
                    None => set.join_next().await,
                };
                let Some(joined) = next else { break };

                match joined {
                    Ok((ip, found)) => {
                        done.insert(ip);
                        if let Some((port, latency_ms)) = found {
                            live.push(DiscoveredHost {
                                ip,
                                name: None,
                                via_port: Some(port),
                                latency_ms: Some(latency_ms),
                            });
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Probe task failed"),
                }
            }

            if expired {
                set.abort_all();
                tracing::warn!(
                    range = %range,
                    batch = index + 1,
                    batches,
                    live = live.len(),
                    "Sweep deadline reached, returning partial results"
                );
                break;
            }

            if let Some(tx) = &options.progress {
                let _ = tx.send(SweepProgress {
                    batch: index + 1,
                    batches,
                    probed: done.len(),
                    live: live.len(),
                });
            }
        }

        if !expired {
            self.resolve_names(&mut live, options.resolve_timeout, deadline)
                .await;
        }
        live.sort_by_key(|h| h.ip);

        tracing::info!(
            range = %range,
            live = live.len(),
            probed = done.len(),
            partial = expired,
            duration_ms = started.elapsed().as_millis() as u64,
            "Sweep complete"
        );
        Ok(SweepOutcome {
            hosts: live,
            probed: done,
            partial: expired,
        })
    }

    /// Fill in display names: inventory name first, else reverse DNS.
    /// Failures leave the name empty.
    async fn resolve_names(
        &self,
        hosts: &mut [DiscoveredHost],
        limit: Duration,
        deadline: Option<Instant>,
    ) {
        let mut set = JoinSet::new();
        for (index, host) in hosts.iter().enumerate() {
            let ip = host.ip;
            let inventory = self.inventory.clone();
            let resolver = self.resolver.clone();
            set.spawn(async move { (index, lookup_name(inventory, resolver, ip, limit).await) });
        }

        loop {
            let next = match deadline {
                Some(at) => match timeout_at(at, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::debug!("Sweep deadline reached during name pass");
                        set.abort_all();
                        return;
                    }
                },
                None => set.join_next().await,
            };
            let Some(joined) = next else { return };
            if let Ok((index, Some(name))) = joined {
                if let Some(host) = hosts.get_mut(index) {
                    host.name = Some(name);
                }
            }
        }
    }
}

async fn lookup_name(
    inventory: Arc<dyn InventoryStore>,
    resolver: Arc<dyn NameResolver>,
    ip: Ipv4Addr,
    limit: Duration,
) -> Option<String> {
    match inventory.find_host_by_ip(ip).await {
        Ok(Some(host)) if host.name.is_some() => return host.name,
        Ok(_) => {}
        Err(e) => tracing::debug!(ip = %ip, error = %e, "Inventory name lookup failed"),
    }

    match timeout(limit, resolver.reverse(ip)).await {
        Ok(Some(name)) => short_name(&name),
        Ok(None) => None,
        Err(_) => {
            tracing::debug!(ip = %ip, "Reverse lookup timed out");
            None
        }
    }
}

/// The addresses a sweep would probe. CIDR prefixes outside /24–/30 are rejected.
pub fn sweep_targets(range: &AddressRange) -> std::result::Result<Vec<Ipv4Addr>, RangeError> {
    if let AddressRange::Cidr { prefix_length, .. } = *range {
        if !(MIN_SWEEP_PREFIX..=MAX_SWEEP_PREFIX).contains(&prefix_length) {
            return Err(RangeError::InvalidRange(format!(
                "{range}: sweeps are limited to /{MIN_SWEEP_PREFIX} through /{MAX_SWEEP_PREFIX}"
            )));
        }
    }
    range
        .usable()
        .as_slice()
        .map(<[Ipv4Addr]>::to_vec)
        .ok_or_else(|| RangeError::InvalidRange(format!("{range} is too large to sweep")))
}

#[cfg(test)]
mod tests {
    use lanwatch_core::{range, HostFields, MemoryInventory};

    use super::*;
    use crate::error::DiscoverError;
    use crate::testing::{FakeConnector, FakeResolver};

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn sweeper(
        connector: FakeConnector,
        resolver: FakeResolver,
        inventory: Arc<MemoryInventory>,
    ) -> NetworkSweeper {
        NetworkSweeper::new(Arc::new(connector), Arc::new(resolver), inventory)
    }

    #[tokio::test]
    async fn slash_30_finds_the_one_live_host() {
        let s = sweeper(
            FakeConnector::new().open(ip(1), 22),
            FakeResolver::new().name(ip(1), "gateway.lan."),
            Arc::new(MemoryInventory::new()),
        );

        let range = range::parse_descriptor("10.0.0.0/30").unwrap();
        let hosts = s.sweep(&range, &SweepOptions::default()).await.unwrap();

        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].ip, ip(1));
        assert_eq!(hosts[0].via_port, Some(22));
        assert_eq!(hosts[0].name.as_deref(), Some("gateway"));
    }

    #[tokio::test]
    async fn rejects_wide_prefix_before_io() {
        let connector = FakeConnector::new();
        let s = sweeper(
            connector.clone(),
            FakeResolver::new(),
            Arc::new(MemoryInventory::new()),
        );

        let range = AddressRange::cidr(Ipv4Addr::new(10, 0, 0, 0), 23).unwrap();
        let err = s.sweep(&range, &SweepOptions::default()).await.unwrap_err();
        assert!(matches!(err, DiscoverError::Range(RangeError::InvalidRange(_))));

        let range = AddressRange::cidr(Ipv4Addr::new(10, 0, 0, 0), 31).unwrap();
        assert!(s.sweep(&range, &SweepOptions::default()).await.is_err());
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn inventory_name_wins_over_reverse_dns() {
        let inventory = Arc::new(MemoryInventory::new());
        inventory
            .upsert_host(
                ip(2),
                HostFields {
                    name: Some("nas".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let s = sweeper(
            FakeConnector::new().open(ip(2), 443).open(ip(3), 80),
            FakeResolver::new()
                .name(ip(2), "something-else.lan")
                .name(ip(3), "printer.office.lan."),
            inventory,
        );

        let range = range::parse_descriptor("10.0.0.1-6").unwrap();
        let hosts = s.sweep(&range, &SweepOptions::default()).await.unwrap();

        let names: Vec<_> = hosts.iter().map(|h| (h.ip, h.name.clone())).collect();
        assert_eq!(
            names,
            vec![
                (ip(2), Some("nas".to_string())),
                (ip(3), Some("printer".to_string())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_reverse_lookup_times_out_silently() {
        let s = sweeper(
            FakeConnector::new().open(ip(1), 22),
            FakeResolver::new().hang(ip(1)),
            Arc::new(MemoryInventory::new()),
        );

        let range = range::parse_descriptor("10.0.0.0/30").unwrap();
        let hosts = s.sweep(&range, &SweepOptions::default()).await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, None);
    }

    #[tokio::test]
    async fn batches_bound_open_sockets_and_report_progress() {
        let connector = FakeConnector::new()
            .open(ip(5), 80)
            .with_delay(Duration::from_millis(5));
        let s = sweeper(
            connector.clone(),
            FakeResolver::new(),
            Arc::new(MemoryInventory::new()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = SweepOptions {
            batch_size: 4,
            ..SweepOptions::default()
        }
        .with_progress(tx);

        // /28: 14 usable addresses, 4 batches.
        let range = range::parse_descriptor("10.0.0.0/28").unwrap();
        let hosts = s.sweep(&range, &options).await.unwrap();
        assert_eq!(hosts.len(), 1);

        assert!(connector.peak_in_flight() <= 4 * 3);
        let mut updates = Vec::new();
        while let Ok(p) = rx.try_recv() {
            updates.push(p);
        }
        assert_eq!(updates.len(), 4);
        assert_eq!(updates.last().map(|p| (p.probed, p.live)), Some((14, 1)));
        assert!(updates.iter().all(|p| p.batches == 4));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_returns_partial_results() {
        let s = sweeper(
            FakeConnector::new()
                .open(ip(1), 22)
                .open(ip(5), 22)
                .with_delay(Duration::from_secs(1)),
            FakeResolver::new(),
            Arc::new(MemoryInventory::new()),
        );
        let options = SweepOptions {
            batch_size: 2,
            ..SweepOptions::default()
        }
        .with_deadline(Duration::from_millis(2500));

        // /29: .1-.6 in three batches of one second each.
        let range = range::parse_descriptor("10.0.0.0/29").unwrap();
        let outcome = s.sweep_outcome(&range, &options).await.unwrap();

        assert_eq!(outcome.hosts.iter().map(|h| h.ip).collect::<Vec<_>>(), vec![ip(1)]);
        assert!(outcome.partial);
        assert!(outcome.confirms_absent(ip(2)));
        assert!(!outcome.confirms_absent(ip(5)));
        assert!(!outcome.confirms_absent(ip(6)));
    }

    #[tokio::test]
    async fn complete_sweep_confirms_every_absence() {
        let s = sweeper(
            FakeConnector::new().open(ip(1), 22),
            FakeResolver::new(),
            Arc::new(MemoryInventory::new()),
        );
        let range = range::parse_descriptor("10.0.0.0/30").unwrap();
        let outcome = s.sweep_outcome(&range, &SweepOptions::default()).await.unwrap();

        assert!(!outcome.partial);
        assert_eq!(outcome.probed.len(), 2);
        assert!(outcome.confirms_absent(ip(2)));
    }
}
