use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Ports probed by `probe_common_ports` when the caller supplies none: SSH, HTTP, HTTPS, SNMP.
pub const COMMON_PORTS: [u16; 4] = [22, 80, 443, 161];

/// Parse a port list into deduplicated TCP ports (1..=65535), preserving first-seen order.
///
/// Entries are separated by newlines or commas. Each entry is a single port
/// (`80`) or an inclusive range (`8000-8010`); everything after `#` on a line
/// is a comment.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        for entry in line.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some((a, b)) = entry.split_once('-') {
                let start = parse_port(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                for p in start..=end {
                    if seen.insert(p) {
                        out.push(p);
                    }
                }
                continue;
            }

            let p = parse_port(entry)
                .with_context(|| format!("line {line_no}: invalid port value: {entry}"))?;
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    Ok(out)
}

/// Load a port list from a file.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
}

/// Resolve a `--ports` argument: an existing file is read, anything else is parsed
/// as an inline list. An empty result falls back to [`COMMON_PORTS`].
pub fn resolve_ports_arg(arg: Option<&str>) -> Result<Vec<u16>> {
    let Some(arg) = arg else {
        return Ok(default_ports());
    };
    let ports = if Path::new(arg).is_file() {
        load_ports_from_path(arg)?
    } else {
        parse_ports_str(arg)?
    };
    Ok(if ports.is_empty() { default_ports() } else { ports })
}

pub fn default_ports() -> Vec<u16> {
    COMMON_PORTS.to_vec()
}

fn parse_port(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
