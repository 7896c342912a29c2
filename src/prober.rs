use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RangeError;
use crate::netdetect;
use crate::ping::{Pinger, SystemPinger};
use crate::ports::COMMON_PORTS;
use crate::types::{millis, now, ProbeResult};

/// Slack added on top of a caller's timeout before a reachability probe is abandoned.
pub const PROBE_OVERHEAD: Duration = Duration::from_secs(1);

/// Upper bound for any sweep's worker pool.
pub const MAX_CONCURRENCY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Per-probe timeout.
    #[serde(with = "millis", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Maximum probes in flight during a sweep.
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            concurrency: 64,
        }
    }
}

impl ProbeConfig {
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

/// Reachability and port-liveness checks.
///
/// Every check is bounded by a timeout and reports failure as `false`; none
/// of them return an error for an unreachable host.
#[derive(Clone)]
pub struct Prober {
    pinger: Arc<dyn Pinger>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_pinger(Arc::new(SystemPinger::default()), config)
    }

    pub fn with_pinger(pinger: Arc<dyn Pinger>, config: ProbeConfig) -> Self {
        Self { pinger, config }
    }

    pub fn config(&self) -> ProbeConfig {
        self.config
    }

    pub fn pinger(&self) -> Arc<dyn Pinger> {
        self.pinger.clone()
    }

    /// One echo request, single attempt. Returns within `timeout + PROBE_OVERHEAD`.
    pub async fn probe_reachable(&self, host: &str, timeout: Duration) -> bool {
        match time::timeout(timeout + PROBE_OVERHEAD, self.pinger.ping(host, 1, timeout)).await {
            Ok(Ok(report)) => {
                if !report.success {
                    debug!(host, "no echo reply");
                }
                report.success
            }
            Ok(Err(e)) => {
                warn!(host, error = %e, "reachability check could not be performed");
                false
            }
            Err(_) => {
                debug!(host, timeout_ms = timeout.as_millis() as u64, "reachability probe timed out");
                false
            }
        }
    }

    /// True only when a TCP handshake completes. The stream is dropped straight away.
    pub async fn probe_port(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "port closed");
                false
            }
            Err(_) => {
                debug!(host, port, "port probe timed out");
                false
            }
        }
    }

    /// Probe each port independently, at most `concurrency` handshakes in flight.
    /// An empty list means [`COMMON_PORTS`].
    pub async fn probe_common_ports(
        &self,
        host: &str,
        ports: &[u16],
        timeout: Duration,
    ) -> BTreeMap<u16, bool> {
        let ports: &[u16] = if ports.is_empty() { &COMMON_PORTS } else { ports };
        let results = fan_out(
            ports.iter().copied(),
            self.config.effective_concurrency(),
            &CancellationToken::new(),
            |port| {
                let prober = self.clone();
                let host = host.to_string();
                async move { (port, prober.probe_port(&host, port, timeout).await) }
            },
        )
        .await;

        let mut out: BTreeMap<u16, bool> = ports.iter().map(|&p| (p, false)).collect();
        out.extend(results);
        out
    }

    /// Reverse-resolve `ip`; the input comes back unchanged on any failure.
    pub async fn resolve_hostname(&self, ip: &str, timeout: Duration) -> String {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            return ip.to_string();
        };
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr));
        match time::timeout(timeout, lookup).await {
            Ok(Ok(Ok(name))) if !name.is_empty() => name,
            Ok(Ok(Err(e))) => {
                debug!(ip, error = %e, "reverse lookup failed");
                ip.to_string()
            }
            _ => ip.to_string(),
        }
    }

    /// Echo probe plus a handshake on `port`, folded into one record.
    pub async fn probe(&self, host: &str, port: u16) -> ProbeResult {
        let timeout = self.config.timeout;
        let (icmp, tcp) = tokio::join!(
            self.probe_reachable(host, timeout),
            self.probe_port(host, port, timeout)
        );
        ProbeResult {
            host: host.to_string(),
            reachable: icmp || tcp,
            latency_capable: icmp,
            observed_at: now(),
        }
    }

    /// Expand `spec` and return the hosts that answer an echo request, sorted ascending.
    pub async fn scan_range(&self, spec: &str) -> Result<Vec<IpAddr>, RangeError> {
        self.scan_range_with_cancel(spec, CancellationToken::new()).await
    }

    pub async fn scan_range_with_cancel(
        &self,
        spec: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<IpAddr>, RangeError> {
        let hosts = netdetect::parse_range(spec)?;
        info!(spec, hosts = hosts.len(), "scanning range");
        Ok(self.scan_hosts(&hosts, cancel).await)
    }

    /// Probe `hosts` with at most `concurrency` probes in flight.
    pub async fn scan_hosts(&self, hosts: &[IpAddr], cancel: CancellationToken) -> Vec<IpAddr> {
        let timeout = self.config.timeout;
        let results = fan_out(
            hosts.iter().copied(),
            self.config.effective_concurrency(),
            &cancel,
            |ip| {
                let prober = self.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    prober
                        .probe_reachable(&ip.to_string(), timeout)
                        .await
                        .then_some(ip)
                }
            },
        )
        .await;

        let mut alive: Vec<IpAddr> = results.into_iter().flatten().collect();
        alive.sort();
        info!(alive = alive.len(), total = hosts.len(), "scan finished");
        alive
    }
}

/// Run `task` for every item with at most `limit` tasks in flight.
///
/// A permit is taken before each spawn, so no more than `limit` futures exist
/// at once. Items not yet started when `cancel` fires are skipped. Results
/// come back in completion order.
pub async fn fan_out<I, T, F, Fut>(
    items: I,
    limit: usize,
    cancel: &CancellationToken,
    task: F,
) -> Vec<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let sem = Arc::new(Semaphore::new(limit.clamp(1, MAX_CONCURRENCY)));
    let mut set = JoinSet::new();

    for item in items {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let fut = task(item);
        set.spawn(async move {
            let _permit = permit; // held until the task finishes
            fut.await
        });
    }

    let mut out = Vec::new();
    while let Some(res) = set.join_next().await {
        match res {
            Ok(v) => out.push(v),
            Err(e) => warn!(error = %e, "fan-out task failed"),
        }
    }
    out
}
