use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PingError;
use crate::ping::{parse_packet_loss, parse_rtt, PingReport, Pinger, SystemPinger};
use crate::prober::fan_out;
use crate::types::{millis, now, AvailabilityReport, AvailabilityWindow, PingOutcome, PingSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Spacing between availability ticks.
    #[serde(with = "millis", rename = "tick_ms")]
    pub tick: Duration,
    /// Timeout for each echo request.
    #[serde(with = "millis", rename = "probe_timeout_ms")]
    pub probe_timeout: Duration,
    /// Maximum pings in flight during a watch round.
    pub concurrency: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(2),
            concurrency: 64,
        }
    }
}

/// Samples latency and availability over time.
///
/// Per-host history lives only as long as the monitor. It is appended to by
/// the monitor's own loops, which take `&mut self`, so no locking is needed.
pub struct AvailabilityMonitor {
    pinger: Arc<dyn Pinger>,
    config: MonitorConfig,
    history: HashMap<String, Vec<PingSample>>,
}

impl AvailabilityMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_pinger(Arc::new(SystemPinger::default()), config)
    }

    pub fn with_pinger(pinger: Arc<dyn Pinger>, config: MonitorConfig) -> Self {
        Self {
            pinger,
            config,
            history: HashMap::new(),
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    /// Every sample taken for `host` by this monitor, oldest first.
    pub fn history(&self, host: &str) -> &[PingSample] {
        self.history.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    /// One batch of `count` echo requests, summarised into a sample.
    pub async fn ping_once(&self, host: &str, count: u32, timeout: Duration) -> PingSample {
        ping_once(self.pinger.as_ref(), host, count, timeout).await
    }

    /// Sample `host` once per tick for `duration_minutes` ticks.
    ///
    /// Cancellation is checked between ticks; a cancelled run returns the
    /// samples gathered so far with `cancelled` set.
    pub async fn track_availability(
        &mut self,
        host: &str,
        duration_minutes: u32,
        cancel: &CancellationToken,
    ) -> AvailabilityReport {
        let mut window = AvailabilityWindow::new(host);
        let mut cancelled = false;
        let mut ticker = time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for tick in 0..duration_minutes {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = ticker.tick() => {}
            }
            let sample = self.ping_once(host, 1, self.config.probe_timeout).await;
            debug!(host, tick, success = sample.is_success(), "availability tick");
            self.history
                .entry(host.to_string())
                .or_default()
                .push(sample.clone());
            window.samples.push(sample);
        }

        let report = AvailabilityReport::from_window(window, cancelled);
        info!(
            host,
            checks = report.total_checks,
            availability = report.availability_percentage,
            cancelled,
            "availability tracking finished"
        );
        report
    }

    /// Ping every host each `interval` until cancelled, handing each sample to
    /// `on_sample`. Returns the number of completed rounds.
    pub async fn watch<F>(
        &mut self,
        hosts: &[String],
        interval: Duration,
        count: u32,
        cancel: &CancellationToken,
        mut on_sample: F,
    ) -> u64
    where
        F: FnMut(&PingSample),
    {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rounds = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let timeout = self.config.probe_timeout;
            let mut samples = fan_out(
                hosts.iter().cloned().enumerate(),
                self.config.concurrency,
                cancel,
                |(idx, host)| {
                    let pinger = self.pinger.clone();
                    async move { (idx, ping_once(pinger.as_ref(), &host, count, timeout).await) }
                },
            )
            .await;
            samples.sort_by_key(|(idx, _)| *idx);
            let complete = samples.len() == hosts.len();

            for (_, sample) in samples {
                on_sample(&sample);
                self.history.entry(sample.host.clone()).or_default().push(sample);
            }
            if !complete {
                debug!(rounds, "watch round cut short by cancellation");
                break;
            }
            rounds += 1;
        }
        info!(rounds, "watch stopped");
        rounds
    }
}

/// Run one ping batch through `pinger` and classify the result.
pub async fn ping_once(pinger: &dyn Pinger, host: &str, count: u32, timeout: Duration) -> PingSample {
    let count = count.max(1);
    let report = pinger.ping(host, count, timeout).await;
    sample_from_report(host, count, report)
}

/// Turn a raw ping batch into a [`PingSample`].
///
/// A batch that claims success but whose summary matches no dialect is
/// reported as [`PingOutcome::Unparsed`], never as a success.
pub fn sample_from_report(
    host: &str,
    count: u32,
    report: Result<PingReport, PingError>,
) -> PingSample {
    let (outcome, packet_loss) = match report {
        Ok(report) if report.success => {
            let loss = parse_packet_loss(&report.text);
            match parse_rtt(&report.text) {
                Some(rtt) => (PingOutcome::Replied { rtt }, loss),
                None => {
                    debug!(host, "ping summary matched no dialect");
                    (
                        PingOutcome::Unparsed {
                            detail: "could not parse round-trip statistics".into(),
                        },
                        loss,
                    )
                }
            }
        }
        Ok(report) => (PingOutcome::Unreachable, parse_packet_loss(&report.text)),
        Err(e) => {
            warn!(host, error = %e, "ping could not be performed");
            (PingOutcome::Failed { reason: e.to_string() }, None)
        }
    };

    PingSample {
        host: host.to_string(),
        outcome,
        sample_count: count,
        packet_loss,
        observed_at: now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_summary_is_success() {
        let s = sample_from_report(
            "h",
            4,
            Ok(PingReport::new(true, "min/avg/max/mdev = 1.0/2.5/4.0/0.3 ms")),
        );
        assert!(s.is_success());
        let rtt = s.rtt().unwrap();
        assert_eq!((rtt.min_ms, rtt.avg_ms, rtt.max_ms), (1.0, 2.5, 4.0));
    }

    #[test]
    fn unparsable_success_is_not_promoted() {
        let s = sample_from_report("h", 1, Ok(PingReport::new(true, "1 packets transmitted")));
        assert!(!s.is_success());
        assert!(matches!(s.outcome, PingOutcome::Unparsed { .. }));
        assert!(s.rtt().is_none());
    }

    #[test]
    fn failed_batch_keeps_loss_but_no_rtt() {
        let s = sample_from_report(
            "h",
            2,
            Ok(PingReport::new(false, "2 packets transmitted, 0 received, 100% packet loss")),
        );
        assert_eq!(s.outcome, PingOutcome::Unreachable);
        assert_eq!(s.packet_loss, Some(100.0));
        assert_eq!(s.sample_count, 2);
    }

    #[test]
    fn spawn_error_is_failed() {
        let s = sample_from_report("h", 1, Err(PingError::Spawn("denied".into())));
        assert!(matches!(s.outcome, PingOutcome::Failed { .. }));
    }
}
