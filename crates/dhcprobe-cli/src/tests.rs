//! Unit tests for the CLI runtime.

use std::collections::BTreeMap;
use std::process::ExitCode;

use dhcprobe::StaticRoute;
use dhcprobe::routes;
use dhcprobe::system::{NetworkOps, ProcessTable};

use super::*;

fn run_cli(args: &[&str]) -> (ExitCode, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run(args.iter().copied(), &mut stdout, &mut stderr);
    (
        code,
        String::from_utf8(stdout).expect("stdout is utf-8"),
        String::from_utf8(stderr).expect("stderr is utf-8"),
    )
}

fn is_failure(code: ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::FAILURE)
}

#[test]
fn help_is_rendered_to_stdout() {
    let (code, stdout, stderr) = run_cli(&["dhcprobe", "--help"]);
    assert!(!is_failure(code));
    assert!(stdout.contains("--interface"));
    assert!(stdout.contains("--client"));
    assert!(stderr.is_empty());
}

#[test]
fn unknown_flag_is_rejected_on_stderr() {
    let (code, stdout, stderr) = run_cli(&["dhcprobe", "--bogus"]);
    assert!(is_failure(code));
    assert!(stdout.is_empty());
    assert!(stderr.contains("--bogus"));
}

#[test]
fn missing_interface_is_reported() {
    let (code, _stdout, stderr) = run_cli(&["dhcprobe"]);
    assert!(is_failure(code));
    assert!(
        stderr.contains("no viable interface"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn client_choice_maps_onto_client_kinds() {
    assert_eq!(ClientChoice::Auto.kind(), None);
    assert_eq!(ClientChoice::Dhclient.kind(), Some(ClientKind::Dhclient));
    assert_eq!(ClientChoice::Dhcpcd.kind(), Some(ClientKind::Dhcpcd));
    assert_eq!(ClientChoice::Udhcpc.kind(), Some(ClientKind::Udhcpc));
}

/// Minimal driver standing in for a real client during render tests.
#[derive(Debug)]
struct StubClient;

impl DhcpClient for StubClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Udhcpc
    }

    fn newest_lease(&self, _interface: &str) -> Result<Lease, LeaseError> {
        Ok(Lease::default())
    }

    fn parse_static_routes(&self, raw: &str) -> Vec<StaticRoute> {
        routes::parse_route_pairs(raw)
    }

    fn discover(
        &self,
        _interface: &str,
        _network: &dyn NetworkOps,
        _process_table: &dyn ProcessTable,
        _sink: Option<&mut dhcprobe::clients::OutputSink<'_>>,
    ) -> Result<Lease, LeaseError> {
        Ok(Lease::default())
    }
}

fn sample_lease() -> Lease {
    let mut options = BTreeMap::new();
    options.insert("fixed-address".to_owned(), "192.168.2.74".to_owned());
    options.insert("routers".to_owned(), "192.168.2.1".to_owned());
    options.insert(
        "static_routes".to_owned(),
        "169.254.169.254/32 192.168.2.1".to_owned(),
    );
    Lease::from(options)
}

#[test]
fn render_emits_key_value_lines_and_routes() {
    let mut stdout = Vec::new();
    render(&sample_lease(), &StubClient, false, &mut stdout).expect("render");
    let text = String::from_utf8(stdout).expect("stdout is utf-8");
    assert!(text.contains("fixed-address: 192.168.2.74"));
    assert!(text.contains("route: 169.254.169.254/32 via 192.168.2.1"));
}

#[test]
fn render_emits_json_document() {
    let mut stdout = Vec::new();
    render(&sample_lease(), &StubClient, true, &mut stdout).expect("render");
    let text = String::from_utf8(stdout).expect("stdout is utf-8");
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(
        parsed.get("fixed-address").and_then(serde_json::Value::as_str),
        Some("192.168.2.74")
    );
}
