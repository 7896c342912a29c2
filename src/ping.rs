//! ICMP echo batches and the parsing of their summary reports.
//!
//! The probe itself sits behind the [`Pinger`] trait so the prober and the
//! monitor can be driven by stubs. [`SystemPinger`] shells out to the
//! platform `ping` binary, which avoids needing raw-socket privileges.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::error::PingError;
use crate::types::RttStats;

/// Raw result of one ping batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReport {
    /// Whether the batch exited successfully (at least one reply on most platforms).
    pub success: bool,
    /// Combined textual report.
    pub text: String,
}

impl PingReport {
    pub fn new(success: bool, text: impl Into<String>) -> Self {
        Self {
            success,
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait Pinger: Send + Sync {
    /// Send `count` echo requests to `host`, each waiting at most `timeout`.
    async fn ping(&self, host: &str, count: u32, timeout: Duration)
        -> Result<PingReport, PingError>;
}

/// Runs the system `ping` binary.
#[derive(Debug, Clone)]
pub struct SystemPinger {
    program: String,
}

impl SystemPinger {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
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
    async fn ping(
        &self,
        host: &str,
        count: u32,
        timeout: Duration,
    ) -> Result<PingReport, PingError> {
        if host.is_empty() || host.starts_with('-') || host.contains(char::is_whitespace) {
            return Err(PingError::InvalidHost(host.to_string()));
        }
        let count = count.max(1);

        let mut cmd = Command::new(&self.program);
        if cfg!(windows) {
            cmd.arg("-n")
                .arg(count.to_string())
                .arg("-w")
                .arg(timeout.as_millis().max(1).to_string());
        } else {
            // iputils takes whole seconds for -W
            let secs = timeout.as_millis().div_ceil(1000).max(1);
            cmd.arg("-c")
                .arg(count.to_string())
                .arg("-W")
                .arg(secs.to_string());
        }
        cmd.arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let bound = timeout * count + Duration::from_secs(2);
        match time::timeout(bound, cmd.output()).await {
            Ok(Ok(out)) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&out.stderr);
                if !stderr.trim().is_empty() {
                    text.push_str(&stderr);
                }
                debug!(host, status = %out.status, "ping batch finished");
                Ok(PingReport::new(out.status.success(), text))
            }
            Ok(Err(e)) => Err(PingError::Spawn(e.to_string())),
            Err(_) => Ok(PingReport::new(false, "ping batch timed out")),
        }
    }
}

static UNIX_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"min/avg/max(?:/[a-z]+)?\s*=\s*([\d.]+)/([\d.]+)/([\d.]+)").expect("valid regex")
});

static WINDOWS_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Minimum = (\d+)ms, Maximum = (\d+)ms, Average = (\d+)ms").expect("valid regex")
});

static PACKET_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)% (?:packet )?loss").expect("valid regex"));

/// Known ping summary formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingDialect {
    /// `rtt min/avg/max/mdev = 1.0/2.5/4.0/0.3 ms` (Linux, BSD, macOS, busybox).
    Unix,
    /// `Minimum = 1ms, Maximum = 4ms, Average = 2ms`.
    Windows,
}

/// Dialects in the order they are tried.
pub const PING_DIALECTS: [PingDialect; 2] = [PingDialect::Unix, PingDialect::Windows];

impl PingDialect {
    pub fn parse_rtt(self, report: &str) -> Option<RttStats> {
        match self {
            PingDialect::Unix => {
                let caps = UNIX_RTT.captures(report)?;
                Some(RttStats {
                    min_ms: caps[1].parse().ok()?,
                    avg_ms: caps[2].parse().ok()?,
                    max_ms: caps[3].parse().ok()?,
                })
            }
            PingDialect::Windows => {
                let caps = WINDOWS_RTT.captures(report)?;
                Some(RttStats {
                    min_ms: caps[1].parse().ok()?,
                    max_ms: caps[2].parse().ok()?,
                    avg_ms: caps[3].parse().ok()?,
                })
            }
        }
    }
}

/// First dialect that yields round-trip statistics wins.
pub fn parse_rtt(report: &str) -> Option<RttStats> {
    PING_DIALECTS.iter().find_map(|d| d.parse_rtt(report))
}

pub fn parse_packet_loss(report: &str) -> Option<f64> {
    PACKET_LOSS
        .captures(report)
        .and_then(|caps| caps[1].parse().ok())
}
