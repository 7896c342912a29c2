//! YAML device inventory: a `devices` list plus optional run settings.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::InventoryError;
use crate::executor::ExecutorConfig;
use crate::monitor::MonitorConfig;
use crate::prober::ProbeConfig;
use crate::types::{millis, DeviceDescriptor, DeviceKind, DEFAULT_SSH_PORT};

/// Tunables shared by every fleet operation. Missing keys take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveySettings {
    pub probe: ProbeConfig,
    pub executor: ExecutorConfig,
    pub monitor: MonitorConfig,
    #[serde(with = "millis", rename = "watch_interval_ms")]
    pub watch_interval: Duration,
    pub strict_host_key_checking: bool,
}

impl Default for SurveySettings {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            executor: ExecutorConfig::default(),
            monitor: MonitorConfig::default(),
            watch_interval: Duration::from_secs(10),
            strict_host_key_checking: false,
        }
    }
}

/// One `devices:` entry as written in the file.
#[derive(Debug, Deserialize)]
struct DeviceEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    host: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    device_type: Option<String>,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    settings: SurveySettings,
    #[serde(default)]
    devices: Vec<DeviceEntry>,
}

#[derive(Debug)]
pub struct Inventory {
    pub settings: SurveySettings,
    pub devices: Vec<Arc<DeviceDescriptor>>,
}

impl Inventory {
    pub fn hosts(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.host().to_string()).collect()
    }
}

/// Parse inventory YAML. Every device is validated; the first bad one fails the load.
pub fn parse_inventory(yaml: &str) -> Result<Inventory, InventoryError> {
    let file: InventoryFile = if yaml.trim().is_empty() {
        InventoryFile {
            settings: SurveySettings::default(),
            devices: Vec::new(),
        }
    } else {
        serde_yaml::from_str(yaml)?
    };

    let mut devices = Vec::with_capacity(file.devices.len());
    for (index, entry) in file.devices.into_iter().enumerate() {
        let kind = entry
            .device_type
            .as_deref()
            .map(DeviceKind::from_tag)
            .unwrap_or_default();
        let secret = SecretString::from(entry.password.unwrap_or_default());
        let device = DeviceDescriptor::new(entry.host, entry.port, entry.username, secret, kind)
            .map_err(|source| InventoryError::Device { index, source })?;
        let device = match entry.name {
            Some(name) => device.with_name(name),
            None => device,
        };
        devices.push(Arc::new(device));
    }

    Ok(Inventory {
        settings: file.settings,
        devices,
    })
}

pub fn load_inventory(path: impl AsRef<Path>) -> Result<Inventory, InventoryError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let inventory = parse_inventory(&text)?;
    info!(path = %path.display(), devices = inventory.devices.len(), "inventory loaded");
    Ok(inventory)
}

const SAMPLE_INVENTORY: &str = r#"# fleetwatch inventory
settings:
  probe:
    timeout_ms: 2000
    concurrency: 64
  executor:
    connect_timeout_ms: 10000
    command_timeout_ms: 30000
  monitor:
    tick_ms: 60000
    probe_timeout_ms: 2000
    concurrency: 64
  watch_interval_ms: 10000
  strict_host_key_checking: false

devices:
  - name: server-1
    host: 192.168.1.100
    username: ubuntu
    password: ubuntu123
    device_type: linux
    port: 22
  - name: server-2
    host: 192.168.1.101
    username: ubuntu
    password: ubuntu123
    device_type: linux
    port: 22
  - name: server-3
    host: 192.168.1.102
    username: ubuntu
    password: ubuntu123
    device_type: linux
    port: 22
"#;

/// Write a starter inventory. An existing file is never overwritten.
pub fn write_sample_inventory(path: impl AsRef<Path>) -> Result<(), InventoryError> {
    use std::io::Write;

    let path = path.as_ref();
    let write_err = |source| InventoryError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(write_err)?;
    file.write_all(SAMPLE_INVENTORY.as_bytes()).map_err(write_err)?;
    info!(path = %path.display(), "sample inventory written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_parses() {
        let inv = parse_inventory(SAMPLE_INVENTORY).unwrap();
        assert_eq!(inv.devices.len(), 3);
        assert_eq!(inv.devices[0].name(), "server-1");
        assert_eq!(inv.devices[2].host(), "192.168.1.102");
        assert_eq!(inv.settings, SurveySettings::default());
    }

    #[test]
    fn partial_settings_keep_defaults() {
        let yaml = "settings:\n  probe:\n    concurrency: 8\ndevices: []\n";
        let inv = parse_inventory(yaml).unwrap();
        assert_eq!(inv.settings.probe.concurrency, 8);
        assert_eq!(inv.settings.probe.timeout, Duration::from_secs(2));
        assert_eq!(inv.settings.executor, ExecutorConfig::default());
    }

    #[test]
    fn defaults_for_missing_device_fields() {
        let yaml = "devices:\n  - host: 10.0.0.5\n    username: admin\n    device_type: ios\n";
        let inv = parse_inventory(yaml).unwrap();
        let dev = &inv.devices[0];
        assert_eq!(dev.port(), 22);
        assert_eq!(dev.name(), "10.0.0.5");
        assert_eq!(dev.kind(), DeviceKind::Generic);
    }

    #[test]
    fn invalid_device_reports_index() {
        let yaml = "devices:\n  - host: a\n    username: u\n  - host: b\n";
        match parse_inventory(yaml) {
            Err(InventoryError::Device { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
