use crate::types::{NextHop, RouteEntry, UNKNOWN};

/// Parse `ip route` output.
///
/// Each non-blank line with at least three tokens becomes one entry, in
/// input order; shorter lines are skipped. The next hop is the token after
/// `via` (the third token of the usual `dst via gw` form) and the interface
/// is the token after `dev`.
pub fn extract_routes(raw: &str) -> Vec<RouteEntry> {
    raw.lines().filter_map(parse_route_line).collect()
}

fn parse_route_line(line: &str) -> Option<RouteEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let after = |key: &str| {
        tokens
            .iter()
            .position(|t| *t == key)
            .and_then(|i| tokens.get(i + 1))
    };

    let next_hop = match tokens.iter().position(|t| *t == "via") {
        Some(i) => match tokens.get(i + 1) {
            Some(gw) => NextHop::Gateway((*gw).to_string()),
            None => NextHop::Gateway(UNKNOWN.to_string()),
        },
        None => NextHop::DirectlyConnected,
    };

    Some(RouteEntry {
        destination: tokens[0].to_string(),
        next_hop,
        interface: after("dev")
            .map(|d| (*d).to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    })
}
