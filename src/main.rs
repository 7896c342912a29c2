use std::fs::File;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleetwatch_rs::executor::Executor;
use fleetwatch_rs::inventory::{self, Inventory, SurveySettings};
use fleetwatch_rs::logging::{self, LogConfig, LogFormat};
use fleetwatch_rs::monitor::AvailabilityMonitor;
use fleetwatch_rs::transport::OpenSshTransport;
use fleetwatch_rs::types::{
    AvailabilityReport, DeviceStatus, DeviceStatusReport, PingOutcome, PingSample,
};
use fleetwatch_rs::{netdetect, ports, Collector, Prober, SurveyReport, Surveyor};

/// fleetwatch: reachability, fact collection and availability monitoring for a fleet of hosts.
#[derive(Debug, Parser)]
#[command(
    name = "fleetwatch",
    version,
    about = "Reachability, fact collection and availability monitoring for a fleet of hosts.",
    long_about = None
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format: text or json.
    #[arg(long, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Max probes or devices in flight. Overrides the inventory setting.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Probe timeout in milliseconds. Overrides the inventory setting.
    #[arg(long = "timeout-ms", global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Echo-sweep a range. Without --range, every local IPv4 /24 is scanned.
    Scan {
        /// CIDR, a.b.c.x-y, a.b.c.d-e.f.g.h or a single address.
        #[arg(long)]
        range: Option<String>,
        /// Reverse-resolve the hosts that answered.
        #[arg(long, default_value_t = false)]
        resolve: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check TCP ports on one host.
    Ports {
        #[arg(long)]
        host: String,
        /// Inline list ("22,80,8000-8010") or a ports file. Defaults to 22,80,443,161.
        #[arg(long)]
        ports: Option<String>,
    },
    /// Classify every inventory device as online, ssh-unavailable or offline.
    Discover {
        #[arg(long, default_value = "devices.yaml")]
        inventory: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Discover, then collect facts, interfaces, routes and config from online devices.
    Collect {
        #[arg(long, default_value = "devices.yaml")]
        inventory: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Track availability of one host, one echo request per tick.
    Monitor {
        #[arg(long)]
        host: String,
        /// Number of ticks (one minute each by default).
        #[arg(long, default_value_t = 5)]
        minutes: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Ping every inventory host on an interval until interrupted.
    Watch {
        #[arg(long, default_value = "devices.yaml")]
        inventory: PathBuf,
        #[arg(long = "interval-secs")]
        interval_secs: Option<u64>,
        /// Echo requests per host per round.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Write a starter inventory file.
    InitInventory {
        #[arg(default_value = "devices.yaml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping");
                cancel.cancel();
            }
        });
    }

    match &cli.command {
        Command::Scan {
            range,
            resolve,
            output,
        } => {
            let settings = apply_overrides(SurveySettings::default(), &cli);
            let prober = Prober::new(settings.probe);
            let alive = match range.as_deref() {
                Some(spec) => prober
                    .scan_range_with_cancel(spec, cancel.clone())
                    .await
                    .with_context(|| format!("invalid range '{spec}'"))?,
                None => {
                    let targets = local_targets()?;
                    prober.scan_hosts(&targets, cancel.clone()).await
                }
            };
            let mut rows = Vec::with_capacity(alive.len());
            for ip in &alive {
                let name = if *resolve {
                    prober
                        .resolve_hostname(&ip.to_string(), settings.probe.timeout)
                        .await
                } else {
                    String::new()
                };
                rows.push(HostRow {
                    ip: ip.to_string(),
                    hostname: name,
                });
            }
            println!("\nReachable hosts: {}", rows.len());
            print_table(
                &["ip", "hostname"],
                rows.iter().map(|r| vec![r.ip.clone(), r.hostname.clone()]),
            );
            if let Some(path) = output {
                write_json(path, &rows)?;
            }
        }
        Command::Ports { host, ports: spec } => {
            let settings = apply_overrides(SurveySettings::default(), &cli);
            let list = ports::resolve_ports_arg(spec.as_deref())?;
            let prober = Prober::new(settings.probe);
            let states = prober
                .probe_common_ports(host, &list, settings.probe.timeout)
                .await;
            println!("\nPorts on {host}:");
            print_table(
                &["port", "state"],
                states.iter().map(|(port, open)| {
                    vec![port.to_string(), if *open { "open" } else { "closed" }.to_string()]
                }),
            );
        }
        Command::Discover {
            inventory: path,
            output,
        } => {
            let inv = inventory::load_inventory(path)?;
            let surveyor = surveyor_for(&inv, &cli);
            let reports = surveyor.discover(&inv.devices, &cancel).await;
            print_status_table(&reports);
            if let Some(path) = output {
                write_json(path, &reports)?;
            }
        }
        Command::Collect {
            inventory: path,
            output,
        } => {
            let inv = inventory::load_inventory(path)?;
            let surveyor = surveyor_for(&inv, &cli);
            let reports = surveyor.survey(&inv.devices, &cancel).await;
            print_survey_table(&reports);
            if let Some(path) = output {
                write_json(path, &reports)?;
            }
        }
        Command::Monitor {
            host,
            minutes,
            output,
        } => {
            let settings = apply_overrides(SurveySettings::default(), &cli);
            let mut monitor = AvailabilityMonitor::new(settings.monitor);
            info!(host = %host, minutes, "tracking availability (Ctrl+C to stop)");
            let report = monitor.track_availability(host, *minutes, &cancel).await;
            print_availability(&report);
            if let Some(path) = output {
                write_json(path, &report)?;
            }
        }
        Command::Watch {
            inventory: path,
            interval_secs,
            count,
        } => {
            let inv = inventory::load_inventory(path)?;
            let settings = apply_overrides(inv.settings, &cli);
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(settings.watch_interval);
            let mut monitor = AvailabilityMonitor::new(settings.monitor);
            let hosts = inv.hosts();
            println!("Watching {} host(s) every {:?} (Ctrl+C to stop)", hosts.len(), interval);
            monitor
                .watch(&hosts, interval, *count, &cancel, print_sample)
                .await;
        }
        Command::InitInventory { path } => {
            inventory::write_sample_inventory(path)?;
            println!("Wrote sample inventory to {}", path.display());
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct HostRow {
    ip: String,
    hostname: String,
}

fn apply_overrides(mut settings: SurveySettings, cli: &Cli) -> SurveySettings {
    if let Some(c) = cli.concurrency {
        settings.probe.concurrency = c;
        settings.monitor.concurrency = c;
    }
    if let Some(ms) = cli.timeout_ms {
        settings.probe.timeout = Duration::from_millis(ms);
        settings.monitor.probe_timeout = Duration::from_millis(ms);
    }
    settings
}

fn surveyor_for(inv: &Inventory, cli: &Cli) -> Surveyor {
    let settings = apply_overrides(inv.settings, cli);
    let transport = OpenSshTransport::default().strict_host_key_checking(settings.strict_host_key_checking);
    let executor = Executor::with_transport(Arc::new(transport), settings.executor);
    Surveyor::new(Prober::new(settings.probe), Collector::new(executor))
}

fn local_targets() -> Result<Vec<IpAddr>> {
    let cidrs = netdetect::detect_local_cidrs().context("failed to detect local networks")?;
    let mut targets = Vec::new();
    for cidr in cidrs {
        let ips = netdetect::expand_cidr_to_ips(cidr);
        println!("  - {} ({} hosts)", cidr, ips.len());
        targets.extend(ips);
    }
    targets.sort();
    targets.dedup();
    Ok(targets)
}

const MAX_CELL_CHARS: usize = 60;

fn print_table<I>(headers: &[&str], rows: I)
where
    I: IntoIterator<Item = Vec<String>>,
{
    print!("{}", render_table(headers, rows));
}

/// Left-aligned columns. Cells are clipped to `MAX_CELL_CHARS` characters.
fn render_table<I>(headers: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let clip = |c: &str| -> String { c.chars().take(MAX_CELL_CHARS).collect() };
    let header: Vec<String> = headers.iter().map(|h| clip(h)).collect();
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| row.iter().map(|c| clip(c)).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    // `{:<w$}` pads by char count
    let line = |cells: &[String]| {
        let joined = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", joined.trim_end())
    };

    let mut out = line(&header);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(&rule));
    for row in &rows {
        out.push_str(&line(row));
    }
    out
}

fn print_status_table(reports: &[DeviceStatusReport]) {
    let online = reports
        .iter()
        .filter(|r| r.status == DeviceStatus::Online)
        .count();
    println!("\nDevices: {} (online: {})", reports.len(), online);
    print_table(
        &["name", "host", "status", "icmp"],
        reports.iter().map(|r| {
            vec![
                r.name.clone(),
                r.probe.host.clone(),
                r.status.to_string(),
                r.probe.latency_capable.to_string(),
            ]
        }),
    );
}

fn print_survey_table(reports: &[SurveyReport]) {
    println!("\nSurveyed devices: {}", reports.len());
    print_table(
        &["name", "host", "status", "hostname", "os", "uptime", "ifaces", "routes"],
        reports.iter().map(|r| {
            let mut row = vec![
                r.status.name.clone(),
                r.status.probe.host.clone(),
                r.status.status.to_string(),
            ];
            match &r.snapshot {
                Some(s) => row.extend([
                    s.facts.hostname.clone(),
                    s.facts.os_version.clone(),
                    s.facts.uptime.clone(),
                    s.interfaces.len().to_string(),
                    s.routes.len().to_string(),
                ]),
                None => row.extend(std::iter::repeat(String::from("-")).take(5)),
            }
            row
        }),
    );
}

fn print_availability(report: &AvailabilityReport) {
    println!("\nAvailability for {}", report.host);
    println!("  checks       : {}", report.total_checks);
    println!("  successful   : {}", report.successful_checks);
    println!("  failed       : {}", report.failed_checks);
    println!("  availability : {:.1}%", report.availability_percentage);
    match report.mean_rtt_ms {
        Some(ms) => println!("  mean rtt     : {ms:.2} ms"),
        None => println!("  mean rtt     : n/a"),
    }
    if report.cancelled {
        println!("  (interrupted; partial window)");
    }
}

fn print_sample(sample: &PingSample) {
    match &sample.outcome {
        PingOutcome::Replied { rtt } => println!(
            "{:<20} up    min/avg/max {:.2}/{:.2}/{:.2} ms",
            sample.host, rtt.min_ms, rtt.avg_ms, rtt.max_ms
        ),
        PingOutcome::Unreachable => println!("{:<20} down", sample.host),
        PingOutcome::Unparsed { detail } => println!("{:<20} ?     {detail}", sample.host),
        PingOutcome::Failed { reason } => println!("{:<20} error {reason}", sample.host),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    println!("Wrote JSON results to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_clips_multibyte_cells_on_char_boundaries() {
        let name = format!("{}é-core-router", "a".repeat(59));
        let out = render_table(&["name", "host"], vec![vec![name, "10.0.0.1".to_string()]]);

        let row = out.lines().nth(2).unwrap();
        let expected_cell = format!("{}é", "a".repeat(59));
        assert!(row.starts_with(&expected_cell), "{row}");
        assert!(row.ends_with("10.0.0.1"));
        assert!(!row.contains("core-router"));
        let rule = out.lines().nth(1).unwrap();
        assert!(rule.starts_with(&format!("{}  ", "-".repeat(60))));
    }

    #[test]
    fn table_aligns_columns() {
        let out = render_table(
            &["ip", "hostname"],
            vec![
                vec!["10.0.0.1".to_string(), "gw".to_string()],
                vec!["10.0.0.12".to_string(), "nas".to_string()],
            ],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ip         hostname");
        assert_eq!(lines[1], "---------  --------");
        assert_eq!(lines[2], "10.0.0.1   gw");
        assert_eq!(lines[3], "10.0.0.12  nas");
    }
}
