//! Driver for dhcpcd.
//!
//! dhcpcd keeps its lease database internally and dumps it over stdout on
//! request, so this driver never parses a lease file. It backgrounds
//! itself after the foreground run, announcing the child pid on stdout;
//! the teardown path scrapes that announcement and falls back to polling
//! the pid file dhcpcd names when asked with `-P`.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, thread};

use tracing::{debug, warn};

use crate::clients::{ClientKind, DhcpClient, OutputSink};
use crate::error::LeaseError;
use crate::lease::{self, Lease};
use crate::routes::{self, StaticRoute};
use crate::supervisor::{self, ARTIFACT_POLL, ProcessHandle, ReapGuard};
use crate::system::{BinaryLocator, NetworkOps, ProcessTable};

const DHCPCD_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::clients::dhcpcd");

const FORK_MARKER: &str = "forked to background, child pid ";

/// Driver for the `dhcpcd` binary.
#[derive(Debug, Clone)]
pub struct Dhcpcd {
    client_path: PathBuf,
    timeout: Duration,
}

impl Dhcpcd {
    /// Locates `dhcpcd` and builds the driver.
    ///
    /// Fails with [`LeaseError::MissingClient`] when the binary is not on
    /// the search path.
    pub fn new(locator: &dyn BinaryLocator) -> Result<Self, LeaseError> {
        let binary = ClientKind::Dhcpcd.binary_name();
        let client_path = locator
            .find(binary)
            .ok_or_else(|| LeaseError::MissingClient {
                binary: binary.to_owned(),
            })?;
        Ok(Self {
            client_path,
            timeout: ClientKind::Dhcpcd.default_timeout(),
        })
    }

    /// Overrides the discovery timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn acquisition_handle(&self, interface: &str) -> ProcessHandle {
        ProcessHandle::new(&self.client_path).args([
            "--ipv4only",   // only attempt configuring ipv4
            "--waitip",     // wait for ipv4 to be configured
            "--persistent", // don't deconfigure when dhcpcd exits
            "--noarp",      // don't be slow
            "--script=/bin/true",
            interface,
        ])
    }

    /// Best-effort teardown of the backgrounded dhcpcd.
    ///
    /// The pid file can take very long to arrive and stdout usually
    /// carries the forked child pid, so the stdout announcement is tried
    /// first. Failures are logged, never escalated: the lease already in
    /// hand is worth more than a clean shutdown.
    fn reap_daemon(&self, interface: &str, process_table: &dyn ProcessTable, stdout: &str) {
        let mut reaper = ReapGuard::new("dhcpcd");
        if self.arm_from_stdout(&mut reaper, process_table, stdout) {
            return;
        }

        debug!(target: DHCPCD_TARGET, "pid not in stdout, waiting for pid file");
        let Some(pid_file) = self.query_pid_file(interface) else {
            warn!(
                target: DHCPCD_TARGET,
                interface,
                "could not determine dhcpcd pid file, daemon may be left running"
            );
            return;
        };
        self.arm_from_pid_file(&mut reaper, process_table, &pid_file);
    }

    fn arm_from_stdout(
        &self,
        reaper: &mut ReapGuard,
        process_table: &dyn ProcessTable,
        stdout: &str,
    ) -> bool {
        for line in stdout.lines().rev() {
            if !line.contains(FORK_MARKER) {
                continue;
            }
            let Some(pid) = line
                .split_whitespace()
                .last()
                .and_then(|token| token.parse::<i32>().ok())
            else {
                debug!(
                    target: DHCPCD_TARGET,
                    line,
                    "couldn't parse dhcpcd pid from stdout"
                );
                continue;
            };
            match process_table.process_group(pid) {
                Ok(Some(pgid)) => {
                    debug!(target: DHCPCD_TARGET, pid, pgid, "killing dhcpcd process group");
                    reaper.arm_group(pgid);
                    return true;
                }
                Ok(None) => {
                    debug!(target: DHCPCD_TARGET, pid, "dhcpcd already exited");
                    return true;
                }
                Err(error) => warn!(
                    target: DHCPCD_TARGET,
                    pid,
                    error = %error,
                    "failed to resolve dhcpcd process group"
                ),
            }
        }
        false
    }

    /// Asks dhcpcd where its pid file lives for this argument set.
    ///
    /// The location depends on the arguments passed, so it is queried with
    /// the same command line plus `-P`.
    fn query_pid_file(&self, interface: &str) -> Option<PathBuf> {
        let handle = self.acquisition_handle(interface).arg("-P");
        match supervisor::run_to_completion(&handle, "dhcpcd", self.timeout) {
            Ok(output) => {
                let path = output.stdout.trim();
                if path.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(path))
                }
            }
            Err(error) => {
                warn!(
                    target: DHCPCD_TARGET,
                    error = %error,
                    "failed to query dhcpcd pid file location"
                );
                None
            }
        }
    }

    fn arm_from_pid_file(
        &self,
        reaper: &mut ReapGuard,
        process_table: &dyn ProcessTable,
        pid_file: &Path,
    ) {
        let deadline = supervisor::deadline_after(self.timeout);
        loop {
            if let Some(pid) = fs::read_to_string(pid_file)
                .ok()
                .and_then(|content| content.trim().parse::<i32>().ok())
            {
                match process_table.process_group(pid) {
                    Ok(Some(pgid)) => {
                        debug!(target: DHCPCD_TARGET, pid, pgid, "killing dhcpcd process group");
                        reaper.arm_group(pgid);
                    }
                    Ok(None) => debug!(target: DHCPCD_TARGET, pid, "dhcpcd already exited"),
                    Err(error) => warn!(
                        target: DHCPCD_TARGET,
                        pid,
                        error = %error,
                        "failed to resolve dhcpcd process group"
                    ),
                }
                return;
            }
            if std::time::Instant::now() >= deadline {
                warn!(
                    target: DHCPCD_TARGET,
                    pid_file = %pid_file.display(),
                    "dhcpcd pid file never appeared, daemon may be left running"
                );
                return;
            }
            thread::sleep(ARTIFACT_POLL);
        }
    }
}

impl DhcpClient for Dhcpcd {
    fn kind(&self) -> ClientKind {
        ClientKind::Dhcpcd
    }

    /// Dumps the current lease for `interface` through
    /// `dhcpcd --dumplease`.
    fn newest_lease(&self, interface: &str) -> Result<Lease, LeaseError> {
        let handle = ProcessHandle::new(&self.client_path)
            .args(["--dumplease", "--ipv4only"])
            .arg(interface);
        match supervisor::run_to_completion(&handle, "dhcpcd", self.timeout) {
            Ok(output) => Ok(lease::parse_dhcpcd_dump(&output.stdout, interface)),
            Err(LeaseError::NoLease { detail, .. }) => {
                // A dump that exits non-zero means dhcpcd holds no lease
                // for this interface.
                debug!(target: DHCPCD_TARGET, interface, detail, "dhcpcd has no lease to dump");
                Ok(Lease::default())
            }
            Err(error) => Err(error),
        }
    }

    fn parse_static_routes(&self, raw: &str) -> Vec<StaticRoute> {
        routes::parse_route_pairs(raw)
    }

    fn discover(
        &self,
        interface: &str,
        network: &dyn NetworkOps,
        process_table: &dyn ProcessTable,
        sink: Option<&mut OutputSink<'_>>,
    ) -> Result<Lease, LeaseError> {
        debug!(target: DHCPCD_TARGET, interface, "performing dhcp discovery");

        // dhcpcd assumes the interface is already administratively up when
        // its hooks are disabled.
        network.link_up(interface).map_err(|source| {
            LeaseError::no_lease_caused_by("dhcpcd", "failed to bring link up", source)
        })?;

        let handle = self.acquisition_handle(interface);
        let output = supervisor::run_to_completion(&handle, "dhcpcd", self.timeout)?;
        if let Some(sink) = sink {
            sink(&output.stdout, &output.stderr);
        }

        let dumped = self.newest_lease(interface);
        // Teardown runs whichever way the dump fared; no daemon may
        // survive the attempt.
        self.reap_daemon(interface, process_table, &output.stdout);

        let obtained = dumped?;
        if obtained.is_empty() {
            return Err(LeaseError::no_lease("dhcpcd", "no lease found"));
        }
        Ok(obtained)
    }
}
