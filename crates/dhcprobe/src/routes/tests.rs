//! Unit tests for the static-route codecs.

use rstest::rstest;

use super::*;

fn route(destination: &str, gateway: &str) -> StaticRoute {
    StaticRoute::new(destination, gateway)
}

#[test]
fn rfc3442_parses_isc_comma_encoding() {
    let routes = parse_rfc3442("32,169,254,169,254,130,56,248,255,0,130,56,240,1");
    assert_eq!(
        routes,
        vec![
            route("169.254.169.254/32", "130.56.248.255"),
            route("0.0.0.0/0", "130.56.240.1"),
        ]
    );
}

#[test]
fn rfc3442_parses_dhcpcd_dot_space_encoding() {
    let routes = parse_rfc3442("24.191.168.128 192.168.128.1,0 192.168.128.1");
    assert_eq!(
        routes,
        vec![
            route("191.168.128.0/24", "192.168.128.1"),
            route("0.0.0.0/0", "192.168.128.1"),
        ]
    );
}

#[rstest]
#[case::slash_22("26,104,55,82,123,10,85,128,1,22,104,55,4,10,85,128,1", vec![
    route("104.55.82.123/26", "10.85.128.1"),
    route("104.55.4.0/22", "10.85.128.1"),
])]
#[case::default_route_only("0,130,56,240,1", vec![route("0.0.0.0/0", "130.56.240.1")])]
#[case::slash_8("8,10,10,0,0,1", vec![route("10.0.0.0/8", "10.0.0.1")])]
fn rfc3442_pads_destination_octets(#[case] raw: &str, #[case] expected: Vec<StaticRoute>) {
    assert_eq!(parse_rfc3442(raw), expected);
}

#[test]
fn rfc3442_trailing_semicolon_is_stripped() {
    let routes = parse_rfc3442("0,130,56,240,1;");
    assert_eq!(routes, vec![route("0.0.0.0/0", "130.56.240.1")]);
}

#[rstest]
#[case::mid_route("32,169,254,169,254,130,56,248")]
#[case::prefix_only("24")]
fn rfc3442_truncated_route_is_dropped(#[case] tail: &str) {
    // A complete route followed by a truncated one keeps only the former.
    let raw = format!("0,130,56,240,1,{tail}");
    assert_eq!(parse_rfc3442(&raw), vec![route("0.0.0.0/0", "130.56.240.1")]);
}

#[rstest]
#[case::empty("")]
#[case::prefix_out_of_range("33,1,2,3,4,5,6,7,8")]
#[case::not_a_number("foo,130,56,240,1")]
fn rfc3442_malformed_input_yields_empty(#[case] raw: &str) {
    assert_eq!(parse_rfc3442(raw), Vec::new());
}

#[test]
fn pair_grammar_parses_dumplease_routes() {
    let routes = parse_route_pairs("0.0.0.0/0 10.0.0.1 168.63.129.16/32 10.0.0.1");
    assert_eq!(
        routes,
        vec![
            route("0.0.0.0/0", "10.0.0.1"),
            route("168.63.129.16/32", "10.0.0.1"),
        ]
    );
}

#[rstest]
#[case::empty("")]
#[case::whitespace_only("   ")]
#[case::odd_token_count("0.0.0.0/0 10.0.0.1 168.63.129.16/32")]
fn pair_grammar_malformed_input_yields_empty(#[case] raw: &str) {
    assert_eq!(parse_route_pairs(raw), Vec::new());
}

#[test]
fn routes_preserve_source_order() {
    let routes = parse_route_pairs("10.0.0.0/8 10.0.0.1 0.0.0.0/0 10.0.0.2");
    let destinations: Vec<&str> = routes.iter().map(StaticRoute::destination).collect();
    assert_eq!(destinations, vec!["10.0.0.0/8", "0.0.0.0/0"]);
}
