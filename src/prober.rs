use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::types::ProbeOutcome;

/// Extra time given to the `ping` child beyond its own deadline before it is killed.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// A single reachability check against one address.
///
/// Implementations must not fail: every problem is reported as an offline outcome.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &str) -> ProbeOutcome;
}

/// ICMP echo via the system `ping` binary, one packet per probe.
#[derive(Debug, Clone)]
pub struct PingProber {
    timeout: Duration,
}

impl PingProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: timeout.max(Duration::from_millis(1)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, ip: Ipv4Addr) -> Command {
        let mut cmd = Command::new("ping");
        cmd.args(ping_args(std::env::consts::OS, self.timeout))
            .arg(ip.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Single-echo arguments for the platform `ping`, with the reply wait set to `timeout`.
fn ping_args(os: &str, timeout: Duration) -> Vec<String> {
    let ms = timeout.as_millis().max(1).to_string();
    match os {
        "windows" => vec!["-n".into(), "1".into(), "-w".into(), ms],
        // `-W` is in milliseconds here
        "macos" | "ios" | "freebsd" => vec!["-c".into(), "1".into(), "-W".into(), ms],
        _ => {
            let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
            vec!["-c".into(), "1".into(), "-W".into(), secs.to_string()]
        }
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        // Only dotted quads ever reach the command line
        let Ok(ip) = address.parse::<Ipv4Addr>() else {
            return ProbeOutcome::offline(address);
        };

        let mut cmd = self.command(ip);
        let output = match time::timeout(self.timeout + KILL_GRACE, cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                debug!(%address, error = %e, "ping could not be spawned");
                return ProbeOutcome::offline(address);
            }
            Err(_) => {
                debug!(%address, "ping timed out");
                return ProbeOutcome::offline(address);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || !output.stderr.is_empty() || !reply_received(&stdout) {
            return ProbeOutcome::offline(address);
        }

        ProbeOutcome::online(address, parse_latency_ms(&stdout).unwrap_or(0))
    }
}

/// Whether `ping` output shows an echo reply.
pub fn reply_received(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    lower.contains("bytes from")
        || lower.contains("ttl=")
        || lower.contains(" 1 received")
        || lower.contains(" 1 packets received")
}

/// Extract the round-trip time in whole milliseconds from `ping` output.
///
/// Understands `time=23.4 ms` (Unix), `time=23ms`, `time<1ms` and `Average = 23ms` (Windows).
pub fn parse_latency_ms(output: &str) -> Option<u64> {
    let lower = output.to_ascii_lowercase();
    for marker in ["time=", "time<", "average = "] {
        if let Some(idx) = lower.find(marker) {
            let rest = &lower[idx + marker.len()..];
            let number: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if let Ok(ms) = number.parse::<f64>() {
                return Some(ms.round() as u64);
            }
        }
    }
    None
}
