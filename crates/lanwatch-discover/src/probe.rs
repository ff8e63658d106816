//! Layered liveness probe for a single address.
//!
//! Layers run in order and stop at the first success:
//! 1. URL check, when the host has a service URL
//! 2. ICMP echo
//! 3. TCP connect to the fallback ports, only after echo fails
//!
//! The probe never returns an error. Every failure mode is logged at `debug`
//! and collapses to an unreachable [`ProbeResult`].

use std::sync::Arc;

use lanwatch_core::range::parse_ipv4;
use lanwatch_core::{HostCheck, ProbeMethod, ProbeResult};

use crate::config::ProbeConfig;
use crate::connect::{first_open_port, Connector, TcpConnector};
use crate::echo::{EchoOutcome, Pinger, SystemPinger};
use crate::error::Result;
use crate::http::{HttpChecker, UrlChecker, UrlOutcome};

/// Loss reported when reachability came from a TCP connect: not measured.
const UNMEASURED_LOSS_PCT: f64 = 100.0;

pub struct LivenessProbe {
    config: ProbeConfig,
    urls: Arc<dyn UrlChecker>,
    pinger: Arc<dyn Pinger>,
    connector: Arc<dyn Connector>,
}

impl LivenessProbe {
    pub fn new(
        config: ProbeConfig,
        urls: Arc<dyn UrlChecker>,
        pinger: Arc<dyn Pinger>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            urls,
            pinger,
            connector,
        }
    }

    /// A probe backed by reqwest, the system `ping`, and real sockets.
    pub fn system(config: ProbeConfig) -> Result<Self> {
        let pinger = SystemPinger::new(&config.ping_path);
        Ok(Self::new(
            config,
            Arc::new(HttpChecker::new()?),
            Arc::new(pinger),
            Arc::new(TcpConnector),
        ))
    }

    /// Status, latency, and loss for `address`.
    pub async fn check_host(&self, address: &str, url: Option<&str>) -> HostCheck {
        self.probe(address, url).await.to_check()
    }

    /// Run the layers against `address` and report which one succeeded.
    pub async fn probe(&self, address: &str, url: Option<&str>) -> ProbeResult {
        let Some(ip) = parse_ipv4(address.trim()) else {
            tracing::debug!(address, "Not a dotted-quad IPv4 address, skipping probe");
            return ProbeResult::unreachable(address);
        };

        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            match self.urls.check(url, self.config.url_timeout()).await {
                UrlOutcome::Reachable { status, latency_ms } => {
                    tracing::debug!(ip = %ip, url, status, latency_ms, "URL reachable");
                    return ProbeResult {
                        address: address.to_string(),
                        reachable: true,
                        latency_ms: Some(latency_ms),
                        packet_loss_pct: None,
                        via_port: None,
                        method: Some(ProbeMethod::Url),
                        measured_loss: false,
                    };
                }
                other => tracing::debug!(ip = %ip, url, outcome = ?other, "URL check failed"),
            }
        }

        match self.pinger.echo(ip, self.config.echo_timeout()).await {
            EchoOutcome::Reply {
                latency_ms,
                packet_loss_pct,
            } => {
                tracing::debug!(ip = %ip, latency_ms = ?latency_ms, packet_loss_pct, "Echo reply");
                return ProbeResult {
                    address: address.to_string(),
                    reachable: true,
                    latency_ms,
                    packet_loss_pct: Some(packet_loss_pct),
                    via_port: None,
                    method: Some(ProbeMethod::Echo),
                    measured_loss: true,
                };
            }
            other => tracing::debug!(ip = %ip, outcome = ?other, "No echo reply"),
        }

        match first_open_port(
            self.connector.clone(),
            ip,
            &self.config.fallback_ports,
            self.config.port_timeout(),
        )
        .await
        {
            Some((port, _)) => ProbeResult {
                address: address.to_string(),
                reachable: true,
                latency_ms: None,
                packet_loss_pct: Some(UNMEASURED_LOSS_PCT),
                via_port: Some(port),
                method: Some(ProbeMethod::Port),
                measured_loss: false,
            },
            None => {
                tracing::debug!(ip = %ip, "All probe layers failed");
                ProbeResult::unreachable(address)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use lanwatch_core::HostStatus;

    use super::*;
    use crate::testing::{FakeConnector, FakePinger, FakeUrlChecker};

    const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    fn probe(urls: FakeUrlChecker, pinger: FakePinger, connector: FakeConnector) -> LivenessProbe {
        LivenessProbe::new(
            ProbeConfig::default(),
            Arc::new(urls),
            Arc::new(pinger),
            Arc::new(connector),
        )
    }

    #[tokio::test]
    async fn url_success_short_circuits() {
        let pinger = FakePinger::new();
        let p = probe(
            FakeUrlChecker::new().reachable("http://192.168.1.20/", 404),
            pinger.clone(),
            FakeConnector::new(),
        );

        let result = p.probe("192.168.1.20", Some("http://192.168.1.20/")).await;
        assert!(result.reachable);
        assert_eq!(result.method, Some(ProbeMethod::Url));
        assert_eq!(pinger.calls(), 0);
    }

    #[tokio::test]
    async fn echo_reply_reports_measured_loss() {
        let p = probe(
            FakeUrlChecker::new(),
            FakePinger::new().reply(IP, 0.8),
            FakeConnector::new(),
        );

        let result = p.probe("192.168.1.20", None).await;
        assert!(result.reachable);
        assert_eq!(result.method, Some(ProbeMethod::Echo));
        assert_eq!(result.latency_ms, Some(0.8));
        assert_eq!(result.packet_loss_pct, Some(0.0));
        assert!(result.measured_loss);
    }

    #[tokio::test]
    async fn failed_url_falls_through_to_echo() {
        let p = probe(
            FakeUrlChecker::new().server_error("http://192.168.1.20/", 503),
            FakePinger::new().reply(IP, 2.0),
            FakeConnector::new(),
        );

        let result = p.probe("192.168.1.20", Some("http://192.168.1.20/")).await;
        assert_eq!(result.method, Some(ProbeMethod::Echo));
    }

    #[tokio::test]
    async fn port_fallback_reports_unmeasured_loss() {
        let p = probe(
            FakeUrlChecker::new(),
            FakePinger::new(),
            FakeConnector::new().open(IP, 8006),
        );

        let result = p.probe("192.168.1.20", None).await;
        assert!(result.reachable);
        assert_eq!(result.via_port, Some(8006));
        assert_eq!(result.method, Some(ProbeMethod::Port));
        assert_eq!(result.latency_ms, None);
        assert_eq!(result.packet_loss_pct, Some(100.0));
        assert!(!result.measured_loss);
    }

    #[tokio::test]
    async fn all_layers_failing_is_offline() {
        let p = probe(FakeUrlChecker::new(), FakePinger::new(), FakeConnector::new());

        let check = p.check_host("192.168.1.20", Some("https://nas.local")).await;
        assert_eq!(check.status, HostStatus::Offline);
        assert_eq!(check.latency_ms, None);
        assert_eq!(check.packet_loss_pct, Some(100.0));
    }

    #[tokio::test]
    async fn invalid_address_does_no_io() {
        let pinger = FakePinger::new();
        let connector = FakeConnector::new();
        let p = probe(FakeUrlChecker::new(), pinger.clone(), connector.clone());

        for bad in ["192.168.1", "192.168.1.256", "a.b.c.d", "", "1.2.3.4.5"] {
            let result = p.probe(bad, None).await;
            assert!(!result.reachable);
            assert_eq!(result.address, bad);
        }
        assert_eq!(pinger.calls(), 0);
        assert_eq!(connector.attempts(), 0);
    }
}
