//! ICMP echo via the system `ping` binary.
//!
//! Raw ICMP sockets need elevated privileges, so the probe shells out to
//! `ping` with a single echo request and parses its output.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

/// Extra time granted to the subprocess beyond its own `-W` deadline.
const PROCESS_SLACK: Duration = Duration::from_secs(1);

/// Outcome of one echo request.
#[derive(Debug, Clone, PartialEq)]
pub enum EchoOutcome {
    /// At least one reply came back.
    Reply {
        latency_ms: Option<f64>,
        packet_loss_pct: f64,
    },
    NoReply,
    /// The probe itself could not run (binary missing, killed, timed out).
    Failed(String),
}

/// Sends echo requests. Swapped out in tests.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn echo(&self, ip: Ipv4Addr, timeout: Duration) -> EchoOutcome;
}

/// Runs the platform `ping` binary.
#[derive(Debug, Clone)]
pub struct SystemPinger {
    path: String,
}

impl SystemPinger {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl Default for SystemPinger {
    fn default() -> Self {
        Self::new("ping")
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn echo(&self, ip: Ipv4Addr, limit: Duration) -> EchoOutcome {
        let output = Command::new(&self.path)
            .args(ping_args(ip, limit))
            .kill_on_drop(true)
            .output();

        match timeout(limit + PROCESS_SLACK, output).await {
            Ok(Ok(out)) => parse_ping_output(&String::from_utf8_lossy(&out.stdout)),
            Ok(Err(e)) => EchoOutcome::Failed(format!("{}: {e}", self.path)),
            Err(_elapsed) => EchoOutcome::Failed("ping timed out".to_string()),
        }
    }
}

/// Arguments for a single echo with a reply deadline.
pub fn ping_args(ip: Ipv4Addr, limit: Duration) -> Vec<String> {
    let millis = limit.as_millis().max(1);
    let target = ip.to_string();

    if cfg!(target_os = "windows") {
        vec!["-n".into(), "1".into(), "-w".into(), millis.to_string(), target]
    } else if cfg!(target_os = "macos") {
        vec!["-c".into(), "1".into(), "-W".into(), millis.to_string(), target]
    } else {
        // Linux iputils takes whole seconds.
        let secs = limit.as_secs().max(1);
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), target]
    }
}

/// Classify `ping` output.
///
/// A reply line carries `bytes from` or a TTL field; "Destination host
/// unreachable" lines carry neither.
pub fn parse_ping_output(output: &str) -> EchoOutcome {
    let replies = output
        .lines()
        .filter(|l| l.contains("bytes from") || l.to_ascii_lowercase().contains("ttl="))
        .count();

    if replies == 0 {
        return EchoOutcome::NoReply;
    }

    EchoOutcome::Reply {
        latency_ms: output.lines().find_map(parse_reply_time),
        packet_loss_pct: output.lines().find_map(parse_loss).unwrap_or(0.0),
    }
}

/// `time=12.3 ms`, `time=4ms`, or Windows' `time<1ms`.
fn parse_reply_time(line: &str) -> Option<f64> {
    let rest = line
        .split_once("time=")
        .or_else(|| line.split_once("time<"))?
        .1;
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

/// `1 packets transmitted, 1 received, 0% packet loss` or `(0% loss)`.
fn parse_loss(line: &str) -> Option<f64> {
    if !line.contains("loss") {
        return None;
    }
    let before = &line[..line.find('%')?];
    let start = before
        .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map_or(0, |i| i + 1);
    before[start..].parse().ok()
}
