//! Fleet-wide passes: classify every device, then collect from the online ones.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collector::Collector;
use crate::prober::{fan_out, Prober};
use crate::types::{now, DeviceDescriptor, DeviceSnapshot, DeviceStatus, DeviceStatusReport, ProbeResult};

/// Result of a survey for one device. `snapshot` is only present for online devices.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SurveyReport {
    pub status: DeviceStatusReport,
    pub snapshot: Option<DeviceSnapshot>,
}

/// Status from the two probes run against a device.
pub fn classify_status(icmp: bool, port_open: bool) -> DeviceStatus {
    match (icmp, port_open) {
        (_, true) => DeviceStatus::Online,
        (true, false) => DeviceStatus::SshUnavailable,
        (false, false) => DeviceStatus::Offline,
    }
}

#[derive(Clone)]
pub struct Surveyor {
    prober: Prober,
    collector: Collector,
}

impl Surveyor {
    pub fn new(prober: Prober, collector: Collector) -> Self {
        Self { prober, collector }
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Echo probe plus a handshake on the device's transport port.
    pub async fn classify(&self, device: &DeviceDescriptor) -> DeviceStatusReport {
        let timeout = self.prober.config().timeout;
        let (icmp, port_open) = tokio::join!(
            self.prober.probe_reachable(device.host(), timeout),
            self.prober.probe_port(device.host(), device.port(), timeout)
        );
        let status = classify_status(icmp, port_open);
        info!(host = device.host(), name = device.name(), %status, "device classified");
        DeviceStatusReport {
            name: device.name().to_string(),
            status,
            probe: ProbeResult {
                host: device.host().to_string(),
                reachable: icmp || port_open,
                latency_capable: icmp,
                observed_at: now(),
            },
        }
    }

    /// Classify every device. Results are sorted by host, then name.
    pub async fn discover(
        &self,
        devices: &[Arc<DeviceDescriptor>],
        cancel: &CancellationToken,
    ) -> Vec<DeviceStatusReport> {
        let mut reports = self
            .for_each_device(devices, cancel, |surveyor, device| async move {
                surveyor.classify(&device).await
            })
            .await;
        reports.sort_by(|a, b| (&a.probe.host, &a.name).cmp(&(&b.probe.host, &b.name)));
        reports
    }

    /// Classify every device and collect a snapshot from each online one.
    pub async fn survey(
        &self,
        devices: &[Arc<DeviceDescriptor>],
        cancel: &CancellationToken,
    ) -> Vec<SurveyReport> {
        let token = cancel.clone();
        let mut reports = self
            .for_each_device(devices, cancel, move |surveyor, device| {
                let token = token.clone();
                async move {
                    let status = surveyor.classify(&device).await;
                    let snapshot = if status.status == DeviceStatus::Online && !token.is_cancelled() {
                        Some(surveyor.collector.snapshot(&device).await)
                    } else {
                        None
                    };
                    SurveyReport { status, snapshot }
                }
            })
            .await;
        reports.sort_by(|a, b| {
            (&a.status.probe.host, &a.status.name).cmp(&(&b.status.probe.host, &b.status.name))
        });
        reports
    }

    /// Run `task` per device with at most `concurrency` in flight.
    async fn for_each_device<T, F, Fut>(
        &self,
        devices: &[Arc<DeviceDescriptor>],
        cancel: &CancellationToken,
        task: F,
    ) -> Vec<T>
    where
        F: Fn(Surveyor, Arc<DeviceDescriptor>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        fan_out(
            devices.iter().cloned(),
            self.prober.config().effective_concurrency(),
            cancel,
            |device| task(self.clone(), device),
        )
        .await
    }
}
