//! Pure parsers turning remote command output into typed records.
//!
//! Nothing in here performs I/O or returns an error: input that matches no
//! known format yields `"unknown"` fields or empty collections.

mod config;
mod facts;
mod interfaces;
mod resources;
mod routes;

pub use config::{assemble_config_blob, ConfigSource, CONFIG_SOURCES};
pub use facts::{extract_facts, FactField, FACT_COMMANDS};
pub use interfaces::{
    extract_interfaces, extract_interfaces_with, render_plain, InterfaceDialect,
};
pub use resources::{extract_counter, extract_cpu_usage, extract_link_state, extract_memory_summary};
pub use routes::extract_routes;
