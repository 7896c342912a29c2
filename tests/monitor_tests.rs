use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetwatch_rs::error::PingError;
use fleetwatch_rs::monitor::{sample_from_report, AvailabilityMonitor, MonitorConfig};
use fleetwatch_rs::ping::{PingReport, Pinger};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

const SUMMARY: &str = "rtt min/avg/max/mdev = 1.0/2.5/4.0/0.3 ms";

/// Replies according to a fixed script, then fails every further call.
struct Scripted {
    script: Vec<bool>,
    calls: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl Scripted {
    fn new(script: Vec<bool>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            cancel_after: None,
        }
    }
}

#[async_trait]
impl Pinger for Scripted {
    async fn ping(&self, _host: &str, _count: u32, _timeout: Duration) -> Result<PingReport, PingError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((after, token)) = &self.cancel_after {
            if n + 1 >= *after {
                token.cancel();
            }
        }
        let ok = self.script.get(n).copied().unwrap_or(false);
        Ok(if ok {
            PingReport::new(true, SUMMARY)
        } else {
            PingReport::new(false, "1 packets transmitted, 0 received, 100% packet loss")
        })
    }
}

#[tokio::test(start_paused = true)]
async fn three_of_five_is_sixty_percent() {
    let pinger = Arc::new(Scripted::new(vec![true, false, true, false, true]));
    let mut monitor = AvailabilityMonitor::with_pinger(pinger.clone(), MonitorConfig::default());
    let start = tokio::time::Instant::now();

    let report = monitor
        .track_availability("10.0.0.5", 5, &CancellationToken::new())
        .await;

    assert_eq!(report.total_checks, 5);
    assert_eq!(report.successful_checks, 3);
    assert_eq!(report.failed_checks, 2);
    assert_eq!(report.availability_percentage, 60.0);
    assert_eq!(report.mean_rtt_ms, Some(2.5));
    assert!(!report.cancelled);
    assert_eq!(pinger.calls.load(Ordering::SeqCst), 5);
    assert_eq!(monitor.history("10.0.0.5").len(), 5);
    // first tick fires immediately, the other four one tick apart
    assert!(start.elapsed() >= Duration::from_secs(4 * 60));
}

#[tokio::test(start_paused = true)]
async fn cancellation_keeps_partial_window() {
    let cancel = CancellationToken::new();
    let mut pinger = Scripted::new(vec![true, true, true, true, true]);
    pinger.cancel_after = Some((2, cancel.clone()));
    let mut monitor = AvailabilityMonitor::with_pinger(Arc::new(pinger), MonitorConfig::default());

    let report = monitor.track_availability("h", 5, &cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.total_checks, 2);
    assert_eq!(report.window.samples.len(), 2);
    assert_eq!(report.availability_percentage, 100.0);
}

#[tokio::test(start_paused = true)]
async fn zero_ticks_is_empty_report() {
    let mut monitor =
        AvailabilityMonitor::with_pinger(Arc::new(Scripted::new(vec![])), MonitorConfig::default());
    let report = monitor.track_availability("h", 0, &CancellationToken::new()).await;
    assert_eq!(report.total_checks, 0);
    assert_eq!(report.availability_percentage, 0.0);
    assert_eq!(report.mean_rtt_ms, None);
}

#[tokio::test(start_paused = true)]
async fn watch_reports_hosts_in_order_until_cancelled() {
    let cancel = CancellationToken::new();
    let pinger = Arc::new(Scripted::new(vec![true; 16]));
    let mut monitor = AvailabilityMonitor::with_pinger(pinger, MonitorConfig::default());
    let hosts = vec!["a".to_string(), "b".to_string()];
    let seen = Arc::new(Mutex::new(Vec::new()));

    let rounds = {
        let seen = seen.clone();
        let token = cancel.clone();
        monitor
            .watch(&hosts, Duration::from_secs(10), 1, &cancel, move |s| {
                let mut seen = seen.lock().unwrap();
                seen.push(s.host.clone());
                if seen.len() == 4 {
                    token.cancel();
                }
            })
            .await
    };

    assert_eq!(rounds, 2);
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "a", "b"]);
    assert_eq!(monitor.history("a").len(), 2);
}

/// Replies after a short delay and records how many pings overlap.
struct Crowded {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Pinger for Crowded {
    async fn ping(&self, _host: &str, _count: u32, _timeout: Duration) -> Result<PingReport, PingError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(PingReport::new(true, SUMMARY))
    }
}

#[tokio::test(start_paused = true)]
async fn watch_round_is_bounded() {
    let pinger = Arc::new(Crowded {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let config = MonitorConfig {
        concurrency: 8,
        ..MonitorConfig::default()
    };
    let mut monitor = AvailabilityMonitor::with_pinger(pinger.clone(), config);
    let hosts: Vec<String> = (1..=200).map(|n| format!("10.1.{}.{}", n / 250, n % 250)).collect();
    let cancel = CancellationToken::new();
    let mut seen = 0usize;

    let rounds = {
        let token = cancel.clone();
        let total = hosts.len();
        monitor
            .watch(&hosts, Duration::from_secs(10), 1, &cancel, |_| {
                seen += 1;
                if seen == total {
                    token.cancel();
                }
            })
            .await
    };

    assert_eq!(rounds, 1);
    assert_eq!(seen, 200);
    assert!(pinger.peak.load(Ordering::SeqCst) <= 8);
    assert_eq!(monitor.history("10.1.0.1").len(), 1);
}

#[test]
fn summary_scenario() {
    let sample = sample_from_report(
        "h",
        4,
        Ok(PingReport::new(true, "min/avg/max/mdev = 1.0/2.5/4.0/0.3 ms")),
    );
    assert!(sample.is_success());
    let rtt = sample.rtt().unwrap();
    assert_eq!(rtt.min_ms, 1.0);
    assert_eq!(rtt.avg_ms, 2.5);
    assert_eq!(rtt.max_ms, 4.0);
}

proptest! {
    /// Property: success and round-trip numbers always come together
    #[test]
    fn success_iff_rtt(success in any::<bool>(), text in ".{0,80}") {
        let sample = sample_from_report("h", 1, Ok(PingReport::new(success, text)));
        prop_assert_eq!(sample.is_success(), sample.rtt().is_some());
        if !success {
            prop_assert!(!sample.is_success());
        }
    }
}
