//! Command-line runtime for ephemeral DHCP lease discovery.
//!
//! The module owns argument parsing, telemetry bootstrapping, driver
//! selection, and lease rendering. The interface is exercised both from
//! the binary entrypoint and from end-to-end tests where the IO streams
//! are substituted.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use clap::error::ErrorKind;
use thiserror::Error;
use tracing::{debug, warn};

use dhcprobe::system::{Iproute2, PathSearch, ProcFs};
use dhcprobe::{ClientKind, DhcpClient, Lease, LeaseError, build_client, select_client};

pub mod telemetry;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// One-shot DHCP lease discovery tool.
///
/// Brings the interface up, drives a system DHCP client with its hook
/// scripts disabled, prints the obtained lease, and leaves no client
/// process behind.
#[derive(Debug, Parser)]
#[command(name = "dhcprobe", version, about)]
pub struct Cli {
    /// Network interface to acquire a lease on.
    #[arg(long, short = 'i')]
    pub interface: Option<String>,

    /// DHCP client to drive, or `auto` to pick the first installed one.
    #[arg(long, value_enum, default_value_t = ClientChoice::Auto)]
    pub client: ClientChoice,

    /// Discovery timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Render the lease as JSON instead of `key: value` lines.
    #[arg(long)]
    pub json: bool,

    /// Tracing filter expression for diagnostic output on stderr.
    #[arg(long, default_value = "warn")]
    pub log_filter: String,
}

/// Client selection as exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClientChoice {
    /// Probe the supported clients in order and use the first installed.
    Auto,
    /// Force isc-dhclient.
    Dhclient,
    /// Force dhcpcd.
    Dhcpcd,
    /// Force BusyBox udhcpc.
    Udhcpc,
}

impl ClientChoice {
    const fn kind(self) -> Option<ClientKind> {
        match self {
            Self::Auto => None,
            Self::Dhclient => Some(ClientKind::Dhclient),
            Self::Dhcpcd => Some(ClientKind::Dhcpcd),
            Self::Udhcpc => Some(ClientKind::Udhcpc),
        }
    }
}

/// Failures surfaced to the user with a non-zero exit code.
#[derive(Debug, Error)]
enum CliError {
    /// Lease acquisition failed.
    #[error(transparent)]
    Lease(#[from] LeaseError),
    /// Writing to one of the output streams failed.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    /// The lease could not be serialised as JSON.
    #[error("failed to render lease as json: {0}")]
    Render(#[from] serde_json::Error),
}

/// Parses `args` and performs one discovery, writing the lease to
/// `stdout` and diagnostics to `stderr`.
///
/// Returns success when a lease (possibly empty) was obtained, failure
/// when argument parsing, telemetry setup, or acquisition failed.
pub fn run<I, T, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let rendered = error.render();
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    drop(write!(stdout, "{rendered}"));
                    ExitCode::SUCCESS
                }
                _ => {
                    drop(write!(stderr, "{rendered}"));
                    ExitCode::FAILURE
                }
            };
        }
    };

    if let Err(error) = telemetry::initialise(&cli.log_filter) {
        drop(writeln!(stderr, "dhcprobe: {error}"));
        return ExitCode::FAILURE;
    }

    match acquire(&cli, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            drop(writeln!(stderr, "dhcprobe: {error}"));
            ExitCode::FAILURE
        }
    }
}

fn acquire(cli: &Cli, stdout: &mut impl Write) -> Result<(), CliError> {
    let interface = cli
        .interface
        .as_deref()
        .ok_or(LeaseError::NoViableInterface)?;
    let timeout = cli.timeout.map(Duration::from_secs);

    let locator = PathSearch;
    let client = match cli.client.kind() {
        Some(kind) => build_client(kind, &locator, timeout)?,
        None => match timeout {
            // A timeout override replaces the selected client's default
            // budget, so rebuild the winner with it.
            Some(_) => {
                let selected = select_client(&locator)?;
                build_client(selected.kind(), &locator, timeout)?
            }
            None => select_client(&locator)?,
        },
    };

    let mut sink = |stdout: &str, stderr: &str| {
        debug!(
            target: CLI_TARGET,
            client_stdout = stdout,
            client_stderr = stderr,
            "dhcp client output"
        );
    };
    let lease = client.discover(interface, &Iproute2, &ProcFs, Some(&mut sink))?;
    if lease.is_empty() {
        warn!(target: CLI_TARGET, interface, "no lease obtained");
    }
    render(&lease, client.as_ref(), cli.json, stdout)
}

fn render(
    lease: &Lease,
    client: &dyn DhcpClient,
    json: bool,
    stdout: &mut impl Write,
) -> Result<(), CliError> {
    if json {
        let rendered = serde_json::to_string_pretty(lease)?;
        writeln!(stdout, "{rendered}")?;
        return Ok(());
    }
    for (key, value) in lease.iter() {
        writeln!(stdout, "{key}: {value}")?;
    }
    if let Some(raw) = lease.static_routes() {
        for route in client.parse_static_routes(raw) {
            writeln!(stdout, "route: {} via {}", route.destination(), route.gateway())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
