use std::fmt::Write as _;

use serde::Deserialize;
use tracing::debug;

use crate::types::{DeviceKind, InterfaceRecord, LinkState};

/// Output formats understood for interface listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceDialect {
    /// JSON from `ip -j addr`.
    Structured,
    /// Human-readable `ip addr`.
    Plain,
}

const LINUX_ORDER: [InterfaceDialect; 2] = [InterfaceDialect::Structured, InterfaceDialect::Plain];
const GENERIC_ORDER: [InterfaceDialect; 1] = [InterfaceDialect::Plain];

impl InterfaceDialect {
    /// Dialects to try for a device kind, most structured first.
    pub fn for_kind(kind: DeviceKind) -> &'static [InterfaceDialect] {
        match kind {
            DeviceKind::Linux => &LINUX_ORDER,
            DeviceKind::Generic => &GENERIC_ORDER,
        }
    }

    /// Remote command producing this dialect.
    pub fn command(self) -> &'static str {
        match self {
            InterfaceDialect::Structured => "ip -j addr",
            InterfaceDialect::Plain => "ip addr",
        }
    }

    /// `None` means the text is not in this dialect.
    pub fn parse(self, raw: &str) -> Option<Vec<InterfaceRecord>> {
        match self {
            InterfaceDialect::Structured => parse_structured(raw),
            InterfaceDialect::Plain => parse_plain(raw),
        }
    }
}

/// Parse with the structured dialect, falling back to plain text.
pub fn extract_interfaces(raw: &str) -> Vec<InterfaceRecord> {
    extract_interfaces_with(raw, &LINUX_ORDER)
}

/// First dialect that recognises `raw` wins; no match yields an empty table.
pub fn extract_interfaces_with(raw: &str, dialects: &[InterfaceDialect]) -> Vec<InterfaceRecord> {
    for dialect in dialects {
        if let Some(records) = dialect.parse(raw) {
            debug!(?dialect, count = records.len(), "interface output parsed");
            return records;
        }
    }
    debug!("interface output matched no dialect");
    Vec::new()
}

#[derive(Deserialize)]
struct JsonLink {
    #[serde(default)]
    ifname: Option<String>,
    #[serde(default)]
    operstate: Option<String>,
    #[serde(default)]
    mtu: Option<u32>,
    #[serde(default)]
    addr_info: Vec<JsonAddr>,
}

#[derive(Deserialize)]
struct JsonAddr {
    #[serde(default)]
    local: Option<String>,
    #[serde(default)]
    prefixlen: Option<u8>,
}

fn parse_structured(raw: &str) -> Option<Vec<InterfaceRecord>> {
    let links: Vec<JsonLink> = serde_json::from_str(raw.trim()).ok()?;
    let records = links
        .into_iter()
        .filter_map(|link| {
            let name = link.ifname.filter(|n| !n.is_empty())?;
            let addresses = link
                .addr_info
                .into_iter()
                .filter_map(|a| {
                    let local = a.local?;
                    Some(match a.prefixlen {
                        Some(len) => format!("{local}/{len}"),
                        None => local,
                    })
                })
                .collect();
            Some(InterfaceRecord {
                name,
                state: LinkState::from_token(link.operstate.as_deref().unwrap_or("")),
                mtu: link.mtu.unwrap_or(0),
                addresses,
            })
        })
        .collect();
    Some(records)
}

fn parse_plain(raw: &str) -> Option<Vec<InterfaceRecord>> {
    let mut records: Vec<InterfaceRecord> = Vec::new();
    let mut in_block = false;

    for line in raw.lines() {
        if line.starts_with(|c: char| c.is_ascii_digit()) {
            in_block = false;
            if let Some(record) = parse_header(line) {
                records.push(record);
                in_block = true;
            }
            continue;
        }
        if !in_block {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.iter().any(|t| *t == "inet" || *t == "inet6") {
            if let (Some(addr), Some(current)) = (tokens.get(1), records.last_mut()) {
                current.addresses.push((*addr).to_string());
            }
        }
    }

    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

/// `2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP ...`
fn parse_header(line: &str) -> Option<InterfaceRecord> {
    let mut parts = line.splitn(3, ':');
    let _index = parts.next()?;
    let name = parts.next()?.trim();
    // veth peers are listed as `veth0@if5`
    let name = name.split('@').next().unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    let rest = parts.next().unwrap_or("");
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    let after = |key: &str| {
        tokens
            .iter()
            .position(|t| *t == key)
            .and_then(|i| tokens.get(i + 1))
            .copied()
    };
    let state_token = after("state")
        .or_else(|| tokens.iter().find(|t| t.starts_with('<')).copied())
        .unwrap_or("");
    let mtu = after("mtu").and_then(|m| m.parse().ok()).unwrap_or(0);

    Some(InterfaceRecord {
        name: name.to_string(),
        state: LinkState::from_token(state_token),
        mtu,
        addresses: Vec::new(),
    })
}

/// Render records in the plain `ip addr` layout that [`extract_interfaces`] reads back.
pub fn render_plain(records: &[InterfaceRecord]) -> String {
    let mut out = String::new();
    for (idx, rec) in records.iter().enumerate() {
        let flags = match rec.state {
            LinkState::Up => "BROADCAST,MULTICAST,UP,LOWER_UP",
            LinkState::Down => "BROADCAST,MULTICAST",
        };
        let _ = writeln!(
            out,
            "{}: {}: <{}> mtu {} state {}",
            idx + 1,
            rec.name,
            flags,
            rec.mtu,
            rec.state
        );
        for addr in &rec.addresses {
            let family = if addr.contains(':') { "inet6" } else { "inet" };
            let _ = writeln!(out, "    {family} {addr} scope global");
        }
    }
    out
}
