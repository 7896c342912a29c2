use crate::types::{now, DeviceKind, Facts, UNKNOWN};

/// Position of each fact command's output in the slice passed to [`extract_facts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactField {
    Hostname = 0,
    Uptime = 1,
    Kernel = 2,
    OsRelease = 3,
}

/// Commands whose outputs feed [`extract_facts`], in positional order.
pub const FACT_COMMANDS: [&str; 4] = ["hostname", "uptime -p", "uname -r", "cat /etc/os-release"];

/// Build [`Facts`] from positional command outputs (see [`FACT_COMMANDS`]).
///
/// Missing or blank outputs leave their field as [`UNKNOWN`].
pub fn extract_facts(host: &str, kind: DeviceKind, outputs: &[Option<&str>]) -> Facts {
    let get = |field: FactField| outputs.get(field as usize).copied().flatten();

    Facts {
        host: host.to_string(),
        hostname: get(FactField::Hostname)
            .and_then(first_line)
            .unwrap_or_else(unknown),
        uptime: get(FactField::Uptime)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(unknown),
        kernel_version: get(FactField::Kernel)
            .and_then(first_line)
            .unwrap_or_else(unknown),
        os_version: get(FactField::OsRelease)
            .and_then(os_version)
            .unwrap_or_else(unknown),
        vendor: kind.vendor().to_string(),
        observed_at: now(),
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// `VERSION_ID` from os-release, falling back to `PRETTY_NAME`.
fn os_version(text: &str) -> Option<String> {
    let value = |key: &str| {
        text.lines().find_map(|line| {
            let (k, v) = line.trim().split_once('=')?;
            if k.trim() != key {
                return None;
            }
            let v = v.trim().trim_matches(|c| c == '"' || c == '\'');
            (!v.is_empty()).then(|| v.to_string())
        })
    };
    value("VERSION_ID").or_else(|| value("PRETTY_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_version_id() {
        let release = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nPRETTY_NAME=\"Ubuntu 22.04.3 LTS\"\n";
        let facts = extract_facts("h", DeviceKind::Linux, &[None, None, None, Some(release)]);
        assert_eq!(facts.os_version, "22.04");
    }

    #[test]
    fn falls_back_to_pretty_name() {
        let release = "PRETTY_NAME='Debian GNU/Linux trixie/sid'\n";
        let facts = extract_facts("h", DeviceKind::Linux, &[None, None, None, Some(release)]);
        assert_eq!(facts.os_version, "Debian GNU/Linux trixie/sid");
    }

    #[test]
    fn unrecognized_text_is_unknown() {
        let facts = extract_facts("h", DeviceKind::Generic, &[Some("  \n"), None, None, Some("garbage")]);
        assert_eq!(facts.hostname, UNKNOWN);
        assert_eq!(facts.os_version, UNKNOWN);
        assert_eq!(facts.vendor, UNKNOWN);
    }
}
