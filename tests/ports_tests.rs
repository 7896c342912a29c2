use fleetwatch_rs::ports::{parse_ports_str, resolve_ports_arg, COMMON_PORTS};
use std::io::Write;

#[test]
fn parse_single_and_ranges_and_comments() {
    let input = r#"
        # common ports
        22
        80  # http
        443 # https
        8000-8002
        8001  # duplicate
        # blank line follows

    "#;

    let ports = parse_ports_str(input).expect("parse ok");
    // Dedup, preserve insertion order of first appearance in each range/line
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn invalid_port_rejected() {
    let input = "0\n"; // invalid: out of range
    assert!(parse_ports_str(input).is_err());
    assert!(parse_ports_str("90-80").is_err());
}

#[test]
fn missing_or_empty_arg_uses_common_ports() {
    assert_eq!(resolve_ports_arg(None).unwrap(), COMMON_PORTS.to_vec());
    assert_eq!(resolve_ports_arg(Some("  # none")).unwrap(), COMMON_PORTS.to_vec());
}

#[test]
fn arg_can_be_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "161\n22-23").unwrap();
    let path = file.path().to_str().unwrap().to_string();
    assert_eq!(resolve_ports_arg(Some(&path)).unwrap(), vec![161, 22, 23]);
}
