use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};

use crate::error::RangeError;

/// Largest number of addresses a single range specification may expand to.
pub const MAX_RANGE_HOSTS: u64 = 65_536;

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// An interface IP `192.168.1.42` becomes `192.168.1.0/24`. Duplicates are removed.
pub fn detect_local_cidrs() -> Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

/// Convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    // /24 is always a valid prefix length
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24).unwrap_or_else(|_| Ipv4Net::from(ip))
}

/// Expand a CIDR into host addresses, excluding network and broadcast.
///
/// A /31 yields both of its addresses and a /32 its single address, since
/// neither has a network or broadcast address to drop. IPv6 networks are not
/// swept and expand to nothing.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(n4) => expand_ipv4net_hosts(n4).map(IpAddr::V4).collect(),
        IpNet::V6(_) => Vec::new(),
    }
}

fn expand_ipv4net_hosts(net: Ipv4Net) -> impl Iterator<Item = Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    let hosts = if net.prefix_len() >= 31 {
        start..=end
    } else {
        start + 1..=end - 1
    };
    hosts.map(Ipv4Addr::from)
}

/// Expand a textual range into individual IPv4 addresses.
///
/// Accepted forms:
/// - `192.168.1.0/24` (network and broadcast excluded, except for /31 and /32)
/// - `192.168.1.1-254` (last-octet range, inclusive)
/// - `192.168.1.10-192.168.2.20` (full-address range, inclusive)
/// - `192.168.1.7` (single address)
pub fn parse_range(spec: &str) -> Result<Vec<IpAddr>, RangeError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(RangeError::Empty);
    }

    if spec.contains('/') {
        let net: IpNet = spec.parse().map_err(|e: ipnet::AddrParseError| {
            RangeError::InvalidCidr {
                spec: spec.to_string(),
                reason: e.to_string(),
            }
        })?;
        let IpNet::V4(n4) = net else {
            return Err(RangeError::Ipv6Unsupported(spec.to_string()));
        };
        let count = 1u64 << (32 - u32::from(n4.prefix_len()));
        check_size(spec, count)?;
        return Ok(expand_cidr_to_ips(net));
    }

    if let Some((a, b)) = spec.split_once('-') {
        let start = parse_v4(a.trim(), spec)?;
        let b = b.trim();
        let end = if b.contains('.') {
            parse_v4(b, spec)?
        } else {
            let last: u8 = b
                .parse()
                .map_err(|_| RangeError::InvalidAddress(b.to_string()))?;
            let o = start.octets();
            Ipv4Addr::new(o[0], o[1], o[2], last)
        };
        let (s, e) = (u32::from(start), u32::from(end));
        if s > e {
            return Err(RangeError::Reversed(spec.to_string()));
        }
        check_size(spec, u64::from(e - s) + 1)?;
        return Ok((s..=e).map(|n| IpAddr::V4(Ipv4Addr::from(n))).collect());
    }

    match spec.parse::<IpAddr>() {
        Ok(ip @ IpAddr::V4(_)) => Ok(vec![ip]),
        Ok(IpAddr::V6(_)) => Err(RangeError::Ipv6Unsupported(spec.to_string())),
        Err(_) => Err(RangeError::InvalidAddress(spec.to_string())),
    }
}

fn parse_v4(s: &str, spec: &str) -> Result<Ipv4Addr, RangeError> {
    match s.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ok(v4),
        Ok(IpAddr::V6(_)) => Err(RangeError::Ipv6Unsupported(spec.to_string())),
        Err(_) => Err(RangeError::InvalidAddress(s.to_string())),
    }
}

fn check_size(spec: &str, count: u64) -> Result<(), RangeError> {
    if count > MAX_RANGE_HOSTS {
        return Err(RangeError::TooLarge {
            spec: spec.to_string(),
            count,
            limit: MAX_RANGE_HOSTS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn default_cidr_from_ipv4() {
        let cidr = ipv4_to_default_cidr(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(cidr.to_string(), "10.1.2.0/24");
    }

    #[test]
    fn slash_24_has_254_hosts() {
        let hosts = parse_range("192.168.1.0/24").unwrap();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts.first(), Some(&v4(192, 168, 1, 1)));
        assert_eq!(hosts.last(), Some(&v4(192, 168, 1, 254)));
    }

    #[test]
    fn last_octet_range() {
        let hosts = parse_range("10.0.0.3-5").unwrap();
        assert_eq!(hosts, vec![v4(10, 0, 0, 3), v4(10, 0, 0, 4), v4(10, 0, 0, 5)]);
    }

    #[test]
    fn full_range_crosses_octets() {
        let hosts = parse_range("10.0.0.254 - 10.0.1.1").unwrap();
        assert_eq!(
            hosts,
            vec![v4(10, 0, 0, 254), v4(10, 0, 0, 255), v4(10, 0, 1, 0), v4(10, 0, 1, 1)]
        );
    }

    #[test]
    fn point_to_point_prefixes_keep_every_address() {
        assert_eq!(parse_range("10.0.0.5/32").unwrap(), vec![v4(10, 0, 0, 5)]);
        assert_eq!(
            parse_range("10.0.0.5/31").unwrap(),
            vec![v4(10, 0, 0, 4), v4(10, 0, 0, 5)]
        );
    }

    #[test]
    fn single_address() {
        assert_eq!(parse_range(" 172.16.0.9 ").unwrap(), vec![v4(172, 16, 0, 9)]);
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert_eq!(parse_range(""), Err(RangeError::Empty));
        assert!(matches!(parse_range("10.0.0.9-3"), Err(RangeError::Reversed(_))));
        assert!(matches!(parse_range("10.0.0.1-300"), Err(RangeError::InvalidAddress(_))));
        assert!(matches!(parse_range("nonsense"), Err(RangeError::InvalidAddress(_))));
        assert!(matches!(parse_range("10.0.0.0/33"), Err(RangeError::InvalidCidr { .. })));
        assert!(matches!(parse_range("fe80::/64"), Err(RangeError::Ipv6Unsupported(_))));
        assert!(matches!(parse_range("10.0.0.0/8"), Err(RangeError::TooLarge { .. })));
    }
}
