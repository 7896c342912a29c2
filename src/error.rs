//! Error types for the fleetwatch library.
//!
//! Only contract violations leave the library as errors. Runtime failures
//! (unreachable hosts, broken sessions, unparseable output) are folded into
//! the returned records instead; [`TransportError`] exists so transports can
//! report what went wrong before the executor turns it into a
//! [`crate::types::CommandStatus`].

use std::path::PathBuf;

use thiserror::Error;

/// A device descriptor that cannot be used at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("device descriptor has an empty host")]
    EmptyHost,
    #[error("device '{host}' has an empty username")]
    EmptyUsername { host: String },
    #[error("device '{host}' uses transport port 0")]
    ZeroPort { host: String },
}

/// A textual address range that could not be expanded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("empty range specification")]
    Empty,
    #[error("invalid address '{0}' in range specification")]
    InvalidAddress(String),
    #[error("invalid CIDR '{spec}': {reason}")]
    InvalidCidr { spec: String, reason: String },
    #[error("range '{0}' ends before it starts")]
    Reversed(String),
    #[error("range '{spec}' expands to {count} addresses (limit {limit})")]
    TooLarge { spec: String, count: u64, limit: u64 },
    #[error("IPv6 ranges are not supported: '{0}'")]
    Ipv6Unsupported(String),
}

/// Failure inside a remote-shell transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to start transport process: {0}")]
    Spawn(String),
    #[error("authentication rejected by {host}: {detail}")]
    Authentication { host: String, detail: String },
    #[error("could not connect to {host}: {detail}")]
    Connect { host: String, detail: String },
    #[error("session to {host} closed unexpectedly")]
    SessionClosed { host: String },
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// Inventory loading failures.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read inventory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write inventory {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid inventory YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("device #{index} in inventory is invalid: {source}")]
    Device {
        index: usize,
        #[source]
        source: DescriptorError,
    },
}

/// Collector requests that cannot be turned into a safe remote command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("invalid interface name '{0}'")]
    InvalidInterfaceName(String),
}

/// Failure to run a ping batch at all (as opposed to the host not answering).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PingError {
    #[error("refusing to ping suspicious host argument '{0}'")]
    InvalidHost(String),
    #[error("failed to run ping: {0}")]
    Spawn(String),
}
