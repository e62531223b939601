//! Unit tests for lease parsing and normalization.

use std::collections::BTreeMap;

use rstest::rstest;

use super::*;

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

const ISC_LEASE_FILE: &str = r#"lease {
  interface "eth0";
  fixed-address 192.168.2.74;
  option subnet-mask 255.255.255.0;
  option routers 192.168.2.1;
  renew 4 2017/07/27 18:02:30;
}
lease {
  interface "eth0";
  fixed-address 192.168.2.84;
  option subnet-mask 255.255.255.0;
  option routers 192.168.2.1;
}
"#;

#[test]
fn isc_parser_returns_blocks_in_file_order() {
    let leases = parse_isc_leases(ISC_LEASE_FILE);
    assert_eq!(leases.len(), 2);
    assert_eq!(
        leases.first().and_then(|l| l.get("fixed-address")).map(String::as_str),
        Some("192.168.2.74")
    );
    assert_eq!(
        leases.last().and_then(|l| l.get("fixed-address")).map(String::as_str),
        Some("192.168.2.84")
    );
}

#[test]
fn isc_parser_strips_quotes_and_option_prefix() {
    let leases = parse_isc_leases(ISC_LEASE_FILE);
    let newest = leases.last().cloned().unwrap_or_default();
    assert_eq!(newest.get("interface").map(String::as_str), Some("eth0"));
    assert_eq!(
        newest.get("subnet-mask").map(String::as_str),
        Some("255.255.255.0")
    );
    assert_eq!(newest.get("routers").map(String::as_str), Some("192.168.2.1"));
}

#[test]
fn isc_parser_keeps_option_keyword_inside_values() {
    let content = "lease {\n  option domain-name \"an option domain\";\n}\n";
    let leases = parse_isc_leases(content);
    assert_eq!(
        leases.first().and_then(|l| l.get("domain-name")).map(String::as_str),
        Some("an option domain")
    );
}

#[rstest]
#[case::empty("")]
#[case::no_blocks("this is not a lease file\n")]
#[case::unterminated("lease {\n  fixed-address 10.0.0.1;\n")]
fn isc_parser_degenerate_input_yields_no_leases(#[case] content: &str) {
    assert_eq!(parse_isc_leases(content), Vec::new());
}

const DHCPCD_DUMP: &str = "broadcast_address='192.168.15.255'
dhcp_lease_time='3600'
dhcp_server_identifier='192.168.0.1'
ip_address='192.168.0.212'
routers='192.168.0.1'
subnet_mask='255.255.240.0'
classless_static_routes='0.0.0.0/0 10.0.0.1'
";

#[test]
fn dhcpcd_dump_is_parsed_and_normalized() {
    let lease = parse_dhcpcd_dump(DHCPCD_DUMP, "eth9");
    assert_eq!(lease.interface(), Some("eth9"));
    assert_eq!(lease.fixed_address(), Some("192.168.0.212"));
    assert_eq!(lease.subnet_mask(), Some("255.255.240.0"));
    assert_eq!(lease.routers(), Some("192.168.0.1"));
    assert_eq!(lease.static_routes(), Some("0.0.0.0/0 10.0.0.1"));
    // Aliases must not survive normalization.
    assert_eq!(lease.get("ip-address"), None);
    assert_eq!(lease.get("classless-static-routes"), None);
    // Unknown keys pass through, hyphenated.
    assert_eq!(lease.get("dhcp-lease-time"), Some("3600"));
}

#[test]
fn dhcpcd_empty_dump_yields_empty_lease() {
    assert!(parse_dhcpcd_dump("", "eth0").is_empty());
    assert!(parse_dhcpcd_dump("\n\n", "eth0").is_empty());
}

#[test]
fn normalize_renames_aliases() {
    let lease = normalize(map(&[
        ("ip-address", "10.0.0.5"),
        ("classless-static-routes", "0.0.0.0/0 10.0.0.1"),
        ("subnet_mask", "255.255.255.0"),
    ]));
    assert_eq!(lease.fixed_address(), Some("10.0.0.5"));
    assert_eq!(lease.static_routes(), Some("0.0.0.0/0 10.0.0.1"));
    assert_eq!(lease.subnet_mask(), Some("255.255.255.0"));
}

#[test]
fn normalize_is_idempotent() {
    let canonical = normalize(map(&[
        ("interface", "eth0"),
        ("fixed-address", "10.0.0.5"),
        ("subnet-mask", "255.255.255.0"),
        ("routers", "10.0.0.1"),
        ("static_routes", "0.0.0.0/0 10.0.0.1"),
        ("domain-name-servers", "10.0.0.2"),
    ]));
    let renormalized = normalize(canonical.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect());
    assert_eq!(renormalized, canonical);
}

#[test]
fn empty_lease_reports_empty() {
    let lease = Lease::default();
    assert!(lease.is_empty());
    assert_eq!(lease.len(), 0);
    assert_eq!(lease.fixed_address(), None);
}

#[test]
fn lease_serializes_as_flat_map() {
    let lease = normalize(map(&[("fixed-address", "10.0.0.5")]));
    let json = serde_json::to_string(&lease).unwrap_or_default();
    assert_eq!(json, r#"{"fixed-address":"10.0.0.5"}"#);
}
