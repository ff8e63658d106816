//! TCP connect probing.
//!
//! A host counts as reachable on a port only when the handshake completes.
//! Ports for one address are raced in a `JoinSet`; the first success aborts
//! the rest.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Outcome of one TCP connect attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Success { port: u16, latency_ms: f64 },
    Timeout,
    ConnectionRefused,
    Unreachable(String),
}

impl Probe {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Opens TCP connections. Swapped out in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: SocketAddrV4, timeout: Duration) -> Probe;
}

/// Real sockets via `tokio::net::TcpStream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddrV4, limit: Duration) -> Probe {
        let start = Instant::now();
        match timeout(limit, TcpStream::connect(SocketAddr::V4(addr))).await {
            Ok(Ok(_stream)) => Probe::Success {
                port: addr.port(),
                latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            },
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                Probe::ConnectionRefused
            }
            Ok(Err(e)) => Probe::Unreachable(e.to_string()),
            Err(_elapsed) => Probe::Timeout,
        }
    }
}

/// Try every port on `ip` concurrently and return the first that accepts.
///
/// Returns `(port, latency_ms)`. Remaining attempts are aborted once one
/// succeeds; at most `ports.len()` sockets are open at a time.
pub async fn first_open_port(
    connector: Arc<dyn Connector>,
    ip: Ipv4Addr,
    ports: &[u16],
    limit: Duration,
) -> Option<(u16, f64)> {
    let mut set = JoinSet::new();
    for &port in ports {
        let connector = connector.clone();
        set.spawn(async move { connector.connect(SocketAddrV4::new(ip, port), limit).await });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Probe::Success { port, latency_ms }) => {
                set.abort_all();
                tracing::debug!(ip = %ip, port, latency_ms, "Port open");
                return Some((port, latency_ms));
            }
            Ok(other) => tracing::trace!(ip = %ip, outcome = ?other, "Port closed"),
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::warn!(ip = %ip, error = %e, "Connect task failed"),
        }
    }
    None
}
