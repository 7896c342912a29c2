use super::InterfaceDialect;
use crate::types::{LinkState, MemorySummary};

/// Link state of the single interface in `ip link show <iface>` output.
pub fn extract_link_state(raw: &str) -> Option<LinkState> {
    InterfaceDialect::Plain
        .parse(raw)
        .and_then(|recs| recs.first().map(|r| r.state))
}

/// A sysfs counter such as `/sys/class/net/eth0/statistics/rx_bytes`.
pub fn extract_counter(raw: &str) -> Option<u64> {
    raw.split_whitespace().next()?.parse().ok()
}

/// Busy CPU percentage (100 - idle) from `top -bn1`'s `Cpu(s)` line.
pub fn extract_cpu_usage(raw: &str) -> Option<f64> {
    let line = raw.lines().find(|l| l.contains("Cpu(s)"))?;
    let (_, fields) = line.split_once(':')?;
    for field in fields.split(',') {
        let field = field.trim();
        let num_end = field
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(field.len());
        let (num, label) = field.split_at(num_end);
        if label.trim_start_matches('%').trim() == "id" {
            let idle: f64 = num.parse().ok()?;
            return Some(((100.0 - idle) * 10.0).round() / 10.0);
        }
    }
    None
}

/// Total/used/free columns of the `Mem:` row of `free -h`.
pub fn extract_memory_summary(raw: &str) -> Option<MemorySummary> {
    let line = raw.lines().find(|l| l.trim_start().starts_with("Mem:"))?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }
    Some(MemorySummary {
        total: tokens[1].to_string(),
        used: tokens[2].to_string(),
        free: tokens[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_state_from_ip_link() {
        let raw = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP mode DEFAULT\n    link/ether 52:54:00:12:34:56 brd ff:ff:ff:ff:ff:ff\n";
        assert_eq!(extract_link_state(raw), Some(LinkState::Up));
        assert_eq!(extract_link_state("Device \"eth9\" does not exist."), None);
    }

    #[test]
    fn counters() {
        assert_eq!(extract_counter("123456789\n"), Some(123_456_789));
        assert_eq!(extract_counter("cat: no such file"), None);
    }

    #[test]
    fn cpu_from_procps_formats() {
        let modern = "top - 10:00:00 up 3 days\n%Cpu(s):  3.1 us,  1.0 sy,  0.0 ni, 95.2 id,  0.7 wa\n";
        assert_eq!(extract_cpu_usage(modern), Some(4.8));
        let legacy = "Cpu(s):  2.0%us,  1.0%sy,  0.0%ni, 97.0%id,  0.0%wa\n";
        assert_eq!(extract_cpu_usage(legacy), Some(3.0));
        assert_eq!(extract_cpu_usage("nothing"), None);
    }

    #[test]
    fn memory_row() {
        let raw = "               total        used        free      shared  buff/cache   available\nMem:           15Gi       4.2Gi       8.1Gi       312Mi       3.1Gi        10Gi\nSwap:          2.0Gi          0B       2.0Gi\n";
        assert_eq!(
            extract_memory_summary(raw),
            Some(MemorySummary {
                total: "15Gi".into(),
                used: "4.2Gi".into(),
                free: "8.1Gi".into(),
            })
        );
    }
}
