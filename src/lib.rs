//! Library crate for fleetwatch-rs: reachability probing, remote fact
//! collection and availability monitoring for a fleet of hosts.
pub mod collector;
pub mod error;
pub mod executor;
pub mod extract;
pub mod inventory;
pub mod logging;
pub mod monitor;
pub mod netdetect;
pub mod ping;
pub mod ports;
pub mod prober;
pub mod sweep;
pub mod transport;
pub mod types;

pub use collector::Collector;
pub use executor::{Executor, ExecutorConfig};
pub use inventory::{load_inventory, Inventory, SurveySettings};
pub use monitor::{AvailabilityMonitor, MonitorConfig};
pub use prober::{ProbeConfig, Prober};
pub use sweep::{SurveyReport, Surveyor};
