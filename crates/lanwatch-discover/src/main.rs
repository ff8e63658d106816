//! CLI entry point for the lanwatch-discover engine.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use lanwatch_core::range::parse_descriptor;
use lanwatch_core::{AddressRange, InventoryStore, MemoryInventory, MonitoredNetwork};
use lanwatch_graph::{GraphConfig, GraphInventory};
use lanwatch_history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};

use lanwatch_discover::config::DiscoverConfig;
use lanwatch_discover::connect::TcpConnector;
use lanwatch_discover::resolve::DnsResolver;
use lanwatch_discover::{
    LivenessProbe, ManualSweep, NetworkMonitor, NetworkSweeper, ScanScheduler, SweepOptions,
};

#[derive(Parser)]
#[command(name = "lanwatch-discover")]
#[command(about = "Host liveness and subnet discovery for LAN Watch")]
struct Cli {
    /// Target to sweep: CIDR (10.0.1.0/24) or range (10.0.1.1-254).
    #[arg(short, long)]
    target: Option<String>,

    /// Sweep the target once, print live hosts, and exit.
    #[arg(long)]
    once: bool,

    /// Reconcile the one-shot sweep into the inventory.
    #[arg(long, requires = "once")]
    add_hosts: bool,

    /// Probe a single address, print the result, and exit.
    #[arg(long)]
    check: Option<String>,

    /// URL tried first when probing with --check.
    #[arg(long, requires = "check")]
    url: Option<String>,

    /// Run as daemon with scheduled sweeps.
    #[arg(long)]
    daemon: bool,

    /// Store the inventory in Neo4j instead of memory.
    #[arg(long)]
    graph: bool,

    /// Config file prefix (default: lanwatch).
    #[arg(short, long, default_value = "lanwatch")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let discover_config = DiscoverConfig::load(&cli.config)?;

    if let Some(address) = cli.check.as_deref() {
        let probe = LivenessProbe::system(discover_config.probe.clone())?;
        let result = probe.probe(address, cli.url.as_deref()).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if !cli.once && !cli.daemon {
        anyhow::bail!("Specify --check <ip>, --once --target <range>, or --daemon");
    }

    let inventory: Arc<dyn InventoryStore> = if cli.graph {
        let graph_config = load_graph_config(&cli.config);
        let graph = GraphInventory::connect(&graph_config).await?;
        tracing::info!(uri = %graph_config.uri, "Connected to Neo4j");
        Arc::new(graph)
    } else {
        Arc::new(MemoryInventory::new())
    };

    let history: Arc<dyn HistoryStore> = match discover_config.history_dir.as_deref() {
        Some(dir) => Arc::new(FileHistoryStore::new(dir)?),
        None => Arc::new(MemoryHistoryStore::new()),
    };

    let seeded = seed_networks(inventory.as_ref(), &discover_config).await?;
    let monitor = Arc::new(NetworkMonitor::new(
        inventory.clone(),
        history,
        Arc::new(LivenessProbe::system(discover_config.probe.clone())?),
        system_sweeper(inventory.clone()),
        &discover_config.sweep,
    ));

    if cli.once {
        let target = cli
            .target
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--target is required in --once mode"))?;
        run_once(&cli, &discover_config, inventory, &monitor, target).await?;
    } else {
        let scheduler = ScanScheduler::new(monitor, discover_config.default_interval_ms);
        // Seeded networks were stored with their auto-scan flag, so restoring
        // arms them along with anything enabled on a previous run.
        let restored = scheduler.restore().await?;
        tracing::info!(
            seeded = seeded.len(),
            restored,
            active = scheduler.active_networks().len(),
            "Scheduler started"
        );
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown signal received");
        scheduler.shutdown();
    }

    Ok(())
}

async fn run_once(
    cli: &Cli,
    config: &DiscoverConfig,
    inventory: Arc<dyn InventoryStore>,
    monitor: &NetworkMonitor,
    target: &str,
) -> anyhow::Result<()> {
    let range = parse_descriptor(target)?;

    let hosts = match range {
        AddressRange::Cidr {
            network_address,
            prefix_length,
        } if cli.add_hosts => {
            let network = find_or_create_network(inventory.as_ref(), network_address, prefix_length).await?;
            let report = monitor
                .sweep_network(
                    &network.id,
                    ManualSweep {
                        timeout: None,
                        add_hosts: true,
                    },
                )
                .await?;
            tracing::info!(
                cidr = %network.cidr(),
                live = report.hosts.len(),
                added = report.added_count,
                partial = report.partial,
                "One-shot sweep reconciled"
            );
            report.hosts
        }
        _ => {
            if cli.add_hosts {
                tracing::warn!(descriptor = target, "--add-hosts needs a CIDR target; sweeping without reconciling");
            }
            let options =
                SweepOptions::from_config(&config.sweep).with_deadline(config.sweep.manual_deadline());
            system_sweeper(inventory).sweep(&range, &options).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&hosts)?);
    Ok(())
}

fn system_sweeper(inventory: Arc<dyn InventoryStore>) -> NetworkSweeper {
    NetworkSweeper::new(
        Arc::new(TcpConnector),
        Arc::new(DnsResolver::from_system()),
        inventory,
    )
}

/// Upsert the configured networks. A network already stored under the same
/// prefix keeps its id and scan history.
async fn seed_networks(
    inventory: &dyn InventoryStore,
    config: &DiscoverConfig,
) -> anyhow::Result<Vec<MonitoredNetwork>> {
    let existing = inventory.list_monitored_networks().await?;
    let mut seeded = Vec::with_capacity(config.networks.len());

    for seed in &config.networks {
        let mut network = seed.to_network()?;
        if let Some(stored) = existing.iter().find(|n| {
            n.network_address == network.network_address && n.prefix_length == network.prefix_length
        }) {
            network.id = stored.id;
            network.last_scanned_at = stored.last_scanned_at;
        }
        inventory.upsert_monitored_network(&network).await?;
        tracing::info!(network_id = %network.id, cidr = %network.cidr(), "Network seeded");
        seeded.push(network);
    }

    Ok(seeded)
}

async fn find_or_create_network(
    inventory: &dyn InventoryStore,
    network_address: std::net::Ipv4Addr,
    prefix_length: u8,
) -> anyhow::Result<MonitoredNetwork> {
    let existing = inventory.list_monitored_networks().await?;
    if let Some(network) = existing
        .into_iter()
        .find(|n| n.network_address == network_address && n.prefix_length == prefix_length)
    {
        return Ok(network);
    }
    let network = MonitoredNetwork::new(network_address, prefix_length);
    inventory.upsert_monitored_network(&network).await?;
    Ok(network)
}

fn load_graph_config(file_prefix: &str) -> GraphConfig {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LANWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    match cfg.and_then(|c| c.get::<GraphConfig>("neo4j")) {
        Ok(c) => c,
        Err(_) => GraphConfig::default(),
    }
}
