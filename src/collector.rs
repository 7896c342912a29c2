use tracing::{info, warn};

use crate::error::CollectError;
use crate::executor::Executor;
use crate::extract::{
    assemble_config_blob, extract_counter, extract_cpu_usage, extract_facts, extract_link_state,
    extract_memory_summary, extract_routes, InterfaceDialect, CONFIG_SOURCES, FACT_COMMANDS,
};
use crate::types::{
    now, DeviceDescriptor, DeviceSnapshot, Facts, InterfaceCounters, InterfaceRecord,
    InterfaceStatus, ResourceUsage, RouteEntry,
};

const CPU_COMMAND: &str = "top -bn1 | head -n 5";
const MEMORY_COMMAND: &str = "free -h";

/// Pulls operational facts off a device through an [`Executor`].
#[derive(Clone)]
pub struct Collector {
    executor: Executor,
}

impl Collector {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub async fn facts(&self, device: &DeviceDescriptor) -> Facts {
        let results = self.executor.execute_all(device, &FACT_COMMANDS).await;
        let outputs: Vec<Option<&str>> = results.iter().map(|r| r.output()).collect();
        extract_facts(device.host(), device.kind(), &outputs)
    }

    /// Try each dialect for the device kind in turn, running its command.
    pub async fn interfaces(&self, device: &DeviceDescriptor) -> Vec<InterfaceRecord> {
        for dialect in InterfaceDialect::for_kind(device.kind()) {
            let result = self.executor.execute(device, dialect.command()).await;
            if let Some(records) = result.output().and_then(|out| dialect.parse(out)) {
                return records;
            }
            warn!(host = device.host(), ?dialect, "interface dialect did not match, falling back");
        }
        Vec::new()
    }

    pub async fn routes(&self, device: &DeviceDescriptor) -> Vec<RouteEntry> {
        let result = self.executor.execute(device, "ip route").await;
        extract_routes(result.output().unwrap_or(""))
    }

    pub async fn config(&self, device: &DeviceDescriptor) -> String {
        let mut results = Vec::with_capacity(CONFIG_SOURCES.len());
        for source in CONFIG_SOURCES {
            results.push((source.label(), self.executor.execute(device, &source.command()).await));
        }
        let sections: Vec<(&str, Option<&str>)> = results
            .iter()
            .map(|(label, result)| (*label, result.output()))
            .collect();
        assemble_config_blob(&sections)
    }

    /// Facts, interfaces, routes and configuration in one pass.
    pub async fn snapshot(&self, device: &DeviceDescriptor) -> DeviceSnapshot {
        let (facts, interfaces, routes, config) = tokio::join!(
            self.facts(device),
            self.interfaces(device),
            self.routes(device),
            self.config(device)
        );
        info!(
            host = device.host(),
            interfaces = interfaces.len(),
            routes = routes.len(),
            "snapshot collected"
        );
        DeviceSnapshot {
            host: device.host().to_string(),
            name: device.name().to_string(),
            facts,
            interfaces,
            routes,
            config,
            observed_at: now(),
        }
    }

    pub async fn interface_status(
        &self,
        device: &DeviceDescriptor,
        interface: &str,
    ) -> Result<InterfaceStatus, CollectError> {
        validate_interface_name(interface)?;
        let result = self
            .executor
            .execute(device, &format!("ip link show {interface}"))
            .await;
        Ok(InterfaceStatus {
            host: device.host().to_string(),
            interface: interface.to_string(),
            state: result.output().and_then(extract_link_state),
            observed_at: now(),
        })
    }

    pub async fn interface_counters(
        &self,
        device: &DeviceDescriptor,
        interface: &str,
    ) -> Result<InterfaceCounters, CollectError> {
        validate_interface_name(interface)?;
        let rx = format!("cat /sys/class/net/{interface}/statistics/rx_bytes");
        let tx = format!("cat /sys/class/net/{interface}/statistics/tx_bytes");
        let (rx, tx) = tokio::join!(
            self.executor.execute(device, &rx),
            self.executor.execute(device, &tx)
        );
        Ok(InterfaceCounters {
            host: device.host().to_string(),
            interface: interface.to_string(),
            rx_bytes: rx.output().and_then(extract_counter),
            tx_bytes: tx.output().and_then(extract_counter),
            observed_at: now(),
        })
    }

    pub async fn resource_usage(&self, device: &DeviceDescriptor) -> ResourceUsage {
        let (cpu, mem) = tokio::join!(
            self.executor.execute(device, CPU_COMMAND),
            self.executor.execute(device, MEMORY_COMMAND)
        );
        ResourceUsage {
            host: device.host().to_string(),
            cpu_percent: cpu.output().and_then(extract_cpu_usage),
            memory: mem.output().and_then(extract_memory_summary),
            observed_at: now(),
        }
    }
}

/// Interface names end up in a shell command line, so only a conservative
/// character set is accepted.
pub fn validate_interface_name(name: &str) -> Result<(), CollectError> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | ':' | '-'));
    if ok {
        Ok(())
    } else {
        Err(CollectError::InvalidInterfaceName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_names() {
        assert!(validate_interface_name("eth0").is_ok());
        assert!(validate_interface_name("enp0s31f6.100").is_ok());
        assert!(validate_interface_name("eth0; reboot").is_err());
        assert!(validate_interface_name("$(id)").is_err());
        assert!(validate_interface_name("").is_err());
        assert!(validate_interface_name("-a").is_err());
    }
}
