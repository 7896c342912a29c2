use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::DescriptorError;

/// Placeholder for any fact that could not be extracted.
pub const UNKNOWN: &str = "unknown";

/// Default SSH port used when an inventory entry does not name one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Current UTC time, the timestamp every record is stamped with.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Serde helper storing a `Duration` as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Selects which output dialects are tried when parsing device output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Linux,
    Generic,
}

impl DeviceKind {
    /// Map an inventory `device_type` tag; anything but `linux` is generic.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("linux") {
            DeviceKind::Linux
        } else {
            DeviceKind::Generic
        }
    }

    pub fn vendor(self) -> &'static str {
        match self {
            DeviceKind::Linux => "Linux",
            DeviceKind::Generic => UNKNOWN,
        }
    }
}

/// Connection parameters for one remote host. Immutable once built.
#[derive(Debug)]
pub struct DeviceDescriptor {
    name: String,
    host: String,
    port: u16,
    username: String,
    secret: SecretString,
    kind: DeviceKind,
}

impl DeviceDescriptor {
    /// Validate and build a descriptor. The display name defaults to the host.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: SecretString,
        kind: DeviceKind,
    ) -> Result<Self, DescriptorError> {
        let host = host.into().trim().to_string();
        let username = username.into().trim().to_string();
        if host.is_empty() {
            return Err(DescriptorError::EmptyHost);
        }
        if username.is_empty() {
            return Err(DescriptorError::EmptyUsername { host });
        }
        if port == 0 {
            return Err(DescriptorError::ZeroPort { host });
        }
        Ok(Self {
            name: host.clone(),
            host,
            port,
            username,
            secret,
            kind,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.name = name.trim().to_string();
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }
}

/// Outcome of one reachability probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub host: String,
    pub reachable: bool,
    /// True when the host answered ICMP, so RTT sampling is meaningful.
    pub latency_capable: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// The transport port completed a handshake.
    Online,
    /// ICMP answers but the transport port is closed.
    SshUnavailable,
    Offline,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "online",
            DeviceStatus::SshUnavailable => "ssh_unavailable",
            DeviceStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatusReport {
    pub name: String,
    pub status: DeviceStatus,
    pub probe: ProbeResult,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStage {
    Connect,
    Command,
}

/// Exit indicator of a remote command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandStatus {
    Exited { code: i32 },
    TransportFailed { reason: String },
    TimedOut { stage: TimeoutStage },
}

/// Raw output of one command executed in its own session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub host: String,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub status: CommandStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl CommandResult {
    /// Exit code zero and nothing written to stderr.
    pub fn is_success(&self) -> bool {
        matches!(self.status, CommandStatus::Exited { code: 0 }) && self.stderr.trim().is_empty()
    }

    /// Stdout of a successful command.
    pub fn output(&self) -> Option<&str> {
        if self.is_success() {
            Some(&self.stdout)
        } else {
            None
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Facts {
    pub host: String,
    pub hostname: String,
    pub kernel_version: String,
    pub os_version: String,
    pub uptime: String,
    pub vendor: String,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Up,
    Down,
}

impl LinkState {
    /// Up iff the token contains `UP`, ignoring case.
    pub fn from_token(token: &str) -> Self {
        if token.to_ascii_uppercase().contains("UP") {
            LinkState::Up
        } else {
            LinkState::Down
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Up => f.write_str("UP"),
            LinkState::Down => f.write_str("DOWN"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: String,
    pub state: LinkState,
    pub mtu: u32,
    pub addresses: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NextHop {
    Gateway(String),
    DirectlyConnected,
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextHop::Gateway(addr) => f.write_str(addr),
            NextHop::DirectlyConnected => f.write_str("directly-connected"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: String,
    pub next_hop: NextHop,
    pub interface: String,
}

/// Everything one collection cycle produced for one device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub host: String,
    pub name: String,
    pub facts: Facts,
    pub interfaces: Vec<InterfaceRecord>,
    pub routes: Vec<RouteEntry>,
    pub config: String,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceStatus {
    pub host: String,
    pub interface: String,
    /// `None` when the status command failed.
    pub state: Option<LinkState>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub host: String,
    pub interface: String,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemorySummary {
    pub total: String,
    pub used: String,
    pub free: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceUsage {
    pub host: String,
    /// Busy CPU percentage from `top`'s summary line.
    pub cpu_percent: Option<f64>,
    pub memory: Option<MemorySummary>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RttStats {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// How a ping batch ended. Round-trip times only exist for `Replied`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PingOutcome {
    Replied { rtt: RttStats },
    Unreachable,
    /// The batch reported success but its summary matched no known dialect.
    Unparsed { detail: String },
    /// The probe itself could not be run.
    Failed { reason: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingSample {
    pub host: String,
    pub outcome: PingOutcome,
    pub sample_count: u32,
    pub packet_loss: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl PingSample {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PingOutcome::Replied { .. })
    }

    pub fn rtt(&self) -> Option<RttStats> {
        match self.outcome {
            PingOutcome::Replied { rtt } => Some(rtt),
            _ => None,
        }
    }
}

/// Ordered samples for one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AvailabilityWindow {
    pub host: String,
    pub samples: Vec<PingSample>,
}

impl AvailabilityWindow {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            samples: Vec::new(),
        }
    }

    pub fn successes(&self) -> usize {
        self.samples.iter().filter(|s| s.is_success()).count()
    }

    /// successes / total * 100, or 0.0 for an empty window.
    pub fn availability_percentage(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.successes() as f64 * 100.0 / self.samples.len() as f64
    }

    pub fn mean_rtt_ms(&self) -> Option<f64> {
        let avgs: Vec<f64> = self
            .samples
            .iter()
            .filter_map(|s| s.rtt().map(|r| r.avg_ms))
            .collect();
        if avgs.is_empty() {
            None
        } else {
            Some(avgs.iter().sum::<f64>() / avgs.len() as f64)
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AvailabilityReport {
    pub host: String,
    pub total_checks: usize,
    pub successful_checks: usize,
    pub failed_checks: usize,
    pub availability_percentage: f64,
    pub mean_rtt_ms: Option<f64>,
    pub cancelled: bool,
    pub window: AvailabilityWindow,
}

impl AvailabilityReport {
    pub fn from_window(window: AvailabilityWindow, cancelled: bool) -> Self {
        let total = window.samples.len();
        let ok = window.successes();
        Self {
            host: window.host.clone(),
            total_checks: total,
            successful_checks: ok,
            failed_checks: total - ok,
            availability_percentage: window.availability_percentage(),
            mean_rtt_ms: window.mean_rtt_ms(),
            cancelled,
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(host: &str, user: &str, port: u16) -> Result<DeviceDescriptor, DescriptorError> {
        DeviceDescriptor::new(host, port, user, SecretString::from("pw".to_string()), DeviceKind::Linux)
    }

    #[test]
    fn descriptor_rejects_missing_fields() {
        assert_eq!(descriptor("", "ubuntu", 22).unwrap_err(), DescriptorError::EmptyHost);
        assert!(matches!(
            descriptor("10.0.0.5", " ", 22),
            Err(DescriptorError::EmptyUsername { .. })
        ));
        assert!(matches!(
            descriptor("10.0.0.5", "ubuntu", 0),
            Err(DescriptorError::ZeroPort { .. })
        ));
    }

    #[test]
    fn descriptor_name_defaults_to_host() {
        let d = descriptor("10.0.0.5", "ubuntu", 22).unwrap();
        assert_eq!(d.name(), "10.0.0.5");
        let d = d.with_name("srv1");
        assert_eq!(d.name(), "srv1");
    }

    #[test]
    fn debug_output_hides_secret() {
        let d = descriptor("10.0.0.5", "ubuntu", 22).unwrap();
        let dbg = format!("{d:?}");
        assert!(!dbg.contains("\"pw\""));
    }

    #[test]
    fn link_state_token_rule() {
        assert_eq!(LinkState::from_token("UP"), LinkState::Up);
        assert_eq!(LinkState::from_token("lower_up"), LinkState::Up);
        assert_eq!(LinkState::from_token("DOWN"), LinkState::Down);
        assert_eq!(LinkState::from_token("UNKNOWN"), LinkState::Down);
    }

    #[test]
    fn empty_window_is_zero_percent() {
        let w = AvailabilityWindow::new("h");
        assert_eq!(w.availability_percentage(), 0.0);
        assert_eq!(w.mean_rtt_ms(), None);
    }
}
