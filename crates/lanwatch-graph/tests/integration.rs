//! Integration tests for lanwatch-graph against a live Neo4j instance.
//!
//! Run with: cargo test --package lanwatch-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use std::net::Ipv4Addr;

use chrono::Utc;
use lanwatch_core::{
    DiscoveryKind, HostFields, HostStatus, InventoryStore, MonitoredNetwork, NetworkId,
};
use lanwatch_graph::{GraphConfig, GraphInventory};

async fn connect_or_skip() -> Option<GraphInventory> {
    let config = GraphConfig::default();
    match GraphInventory::connect(&config).await {
        Ok(inventory) => Some(inventory),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

/// A /24 in 10.0.0.0/8 derived from a fresh id, so parallel runs don't collide.
fn unique_network() -> MonitoredNetwork {
    let bytes = NetworkId::new().0.into_bytes();
    let mut network = MonitoredNetwork::new(Ipv4Addr::new(10, bytes[0], bytes[1], 0), 24);
    network.name = Some("integration".to_string());
    network
}

async fn cleanup(inventory: &GraphInventory, network: &MonitoredNetwork) {
    let q = neo4rs::query(
        "MATCH (n) WHERE (n:Network AND n.id = $id)
            OR (n:DiscoveryEvent AND n.network_id = $id)
            OR (n:Host AND n.ip STARTS WITH $prefix)
         DETACH DELETE n",
    )
    .param("id", network.id.0.to_string())
    .param("prefix", {
        let o = network.network_address.octets();
        format!("{}.{}.{}.", o[0], o[1], o[2])
    });
    let _ = inventory.client().run(q).await;
}

fn host_ip(network: &MonitoredNetwork, last: u8) -> Ipv4Addr {
    let o = network.network_address.octets();
    Ipv4Addr::new(o[0], o[1], o[2], last)
}

#[tokio::test]
#[ignore = "requires live Neo4j: cargo test --package lanwatch-graph --test integration -- --ignored"]
async fn test_network_roundtrip_and_updates() {
    let Some(inv) = connect_or_skip().await else {
        return;
    };
    let network = unique_network();
    cleanup(&inv, &network).await;

    inv.upsert_monitored_network(&network).await.unwrap();
    let stored = inv.get_monitored_network(&network.id).await.unwrap().unwrap();
    assert_eq!(stored.network_address, network.network_address);
    assert_eq!(stored.prefix_length, 24);
    assert!(!stored.auto_scan_enabled);
    assert!(stored.last_scanned_at.is_none());

    inv.update_network_auto_scan(&network.id, true, 60_000).await.unwrap();
    let at = Utc::now();
    inv.update_network_last_scanned(&network.id, at).await.unwrap();

    let stored = inv.get_monitored_network(&network.id).await.unwrap().unwrap();
    assert!(stored.auto_scan_enabled);
    assert_eq!(stored.auto_scan_interval_ms, 60_000);
    assert_eq!(
        stored.last_scanned_at.map(|t| t.timestamp()),
        Some(at.timestamp())
    );

    cleanup(&inv, &network).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j: cargo test --package lanwatch-graph --test integration -- --ignored"]
async fn test_missing_network_update_is_not_found() {
    let Some(inv) = connect_or_skip().await else {
        return;
    };
    let err = inv
        .update_network_last_scanned(&NetworkId::new(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, lanwatch_core::InventoryError::NotFound { .. }));
}

#[tokio::test]
#[ignore = "requires live Neo4j: cargo test --package lanwatch-graph --test integration -- --ignored"]
async fn test_host_merge_is_idempotent_by_ip() {
    let Some(inv) = connect_or_skip().await else {
        return;
    };
    let network = unique_network();
    cleanup(&inv, &network).await;

    let ip = host_ip(&network, 10);
    let created = inv
        .upsert_host(
            ip,
            HostFields {
                status: Some(HostStatus::Online),
                latency_ms: Some(2.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(created.status, HostStatus::Online);
    assert!(created.last_checked_at.is_some());

    let updated = inv
        .upsert_host(
            ip,
            HostFields {
                name: Some("printer".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name.as_deref(), Some("printer"));
    assert_eq!(updated.latency_ms, Some(2.5));

    inv.set_host_status(&created.id, HostStatus::Offline, None, Some(100.0))
        .await
        .unwrap();
    let host = inv.find_host_by_ip(ip).await.unwrap().unwrap();
    assert_eq!(host.status, HostStatus::Offline);
    assert_eq!(host.latency_ms, None);
    assert_eq!(host.packet_loss_pct, Some(100.0));

    cleanup(&inv, &network).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j: cargo test --package lanwatch-graph --test integration -- --ignored"]
async fn test_list_hosts_in_network_filters_by_prefix() {
    let Some(inv) = connect_or_skip().await else {
        return;
    };
    let network = unique_network();
    cleanup(&inv, &network).await;

    for last in [3, 1, 200] {
        inv.upsert_host(host_ip(&network, last), HostFields::default())
            .await
            .unwrap();
    }

    let all = inv
        .list_hosts_in_network(network.network_address, 24)
        .await
        .unwrap();
    let ips: Vec<_> = all.iter().map(|h| h.ip.clone()).collect();
    assert_eq!(
        ips,
        vec![
            host_ip(&network, 1).to_string(),
            host_ip(&network, 3).to_string(),
            host_ip(&network, 200).to_string(),
        ]
    );

    let low = inv
        .list_hosts_in_network(network.network_address, 30)
        .await
        .unwrap();
    assert_eq!(low.len(), 2);

    cleanup(&inv, &network).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j: cargo test --package lanwatch-graph --test integration -- --ignored"]
async fn test_events_list_and_clear() {
    let Some(inv) = connect_or_skip().await else {
        return;
    };
    let network = unique_network();
    cleanup(&inv, &network).await;

    let host = inv
        .upsert_host(host_ip(&network, 5), HostFields::default())
        .await
        .unwrap();
    inv.record_discovery_event(&network.id, DiscoveryKind::NewDevice, &host.id)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    inv.record_discovery_event(&network.id, DiscoveryKind::Disconnected, &host.id)
        .await
        .unwrap();

    let events = inv.list_discovery_events(&network.id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, DiscoveryKind::Disconnected);
    assert_eq!(events[1].kind, DiscoveryKind::NewDevice);

    assert_eq!(inv.clear_discovery_events(&network.id).await.unwrap(), 2);
    assert!(inv.list_discovery_events(&network.id).await.unwrap().is_empty());

    cleanup(&inv, &network).await;
}
