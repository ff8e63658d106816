//! Service URL reachability.
//!
//! Any HTTP status below 500 proves a server process answered, so 4xx
//! responses count as reachable.

use std::error::Error as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;

const USER_AGENT: &str = "LanWatch/0.1";

/// Outcome of one URL check.
#[derive(Debug, Clone, PartialEq)]
pub enum UrlOutcome {
    Reachable { status: u16, latency_ms: f64 },
    /// The server answered with a 5xx status.
    ServerError { status: u16 },
    Timeout,
    Failed(String),
}

impl UrlOutcome {
    fn from_status(status: u16, latency_ms: f64) -> Self {
        if (200..500).contains(&status) {
            Self::Reachable { status, latency_ms }
        } else {
            Self::ServerError { status }
        }
    }
}

/// Checks service URLs. Swapped out in tests.
#[async_trait]
pub trait UrlChecker: Send + Sync {
    async fn check(&self, url: &str, timeout: Duration) -> UrlOutcome;
}

/// `reqwest`-backed checker: HEAD first, then one GET retry that accepts
/// invalid certificates when the HEAD failed on TLS.
#[derive(Clone)]
pub struct HttpChecker {
    client: reqwest::Client,
    insecure: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let insecure = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client, insecure })
    }
}

#[async_trait]
impl UrlChecker for HttpChecker {
    async fn check(&self, url: &str, timeout: Duration) -> UrlOutcome {
        let start = Instant::now();
        let head = self.client.head(url).timeout(timeout).send().await;

        let err = match head {
            Ok(resp) => {
                return UrlOutcome::from_status(resp.status().as_u16(), elapsed_ms(start));
            }
            Err(e) => e,
        };

        if err.is_timeout() {
            return UrlOutcome::Timeout;
        }
        if !is_tls_failure(&err) {
            return UrlOutcome::Failed(err.to_string());
        }

        tracing::debug!(url, error = %err, "HEAD failed on TLS, retrying with GET");
        let start = Instant::now();
        match self.insecure.get(url).timeout(timeout).send().await {
            Ok(resp) => UrlOutcome::from_status(resp.status().as_u16(), elapsed_ms(start)),
            Err(e) if e.is_timeout() => UrlOutcome::Timeout,
            Err(e) => UrlOutcome::Failed(e.to_string()),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Whether any error in the chain mentions a TLS or certificate problem.
fn is_tls_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let msg = e.to_string().to_ascii_lowercase();
        if ["certificate", "tls", "ssl", "handshake"]
            .iter()
            .any(|needle| msg.contains(needle))
        {
            return true;
        }
        current = e.source();
    }
    false
}
