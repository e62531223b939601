//! CLI entrypoint for one-shot DHCP lease discovery.
//!
//! The binary delegates to [`dhcprobe_cli::run`], which parses arguments,
//! initialises telemetry, drives the selected DHCP client against real OS
//! collaborators, and renders the obtained lease.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    dhcprobe_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
