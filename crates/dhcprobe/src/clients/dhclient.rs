//! Driver for isc-dhclient, the legacy client.
//!
//! dhclient is the only supported client that both daemonizes itself and
//! writes its lease to a file the driver controls, so its discovery path
//! exercises the full supervision protocol: artifact cleanup, a one-shot
//! foreground run, bounded waits for the pid and lease files, and a
//! parent-pid probe to confirm the daemon detached before it is reaped.

use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

use tracing::{debug, warn};

use crate::clients::{ClientKind, DhcpClient, OutputSink};
use crate::error::LeaseError;
use crate::lease::{self, Lease};
use crate::routes::{self, StaticRoute};
use crate::supervisor::{self, ARTIFACT_POLL, ProcessHandle, ReapGuard};
use crate::system::{BinaryLocator, NetworkOps, ProcessTable};

const DHCLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::clients::dhclient");

const DEFAULT_LEASE_FILE: &str = "/run/dhclient.lease";
const DEFAULT_PID_FILE: &str = "/run/dhclient.pid";

/// Driver for the isc `dhclient` binary.
#[derive(Debug, Clone)]
pub struct IscDhclient {
    client_path: PathBuf,
    lease_file: PathBuf,
    pid_file: PathBuf,
    timeout: Duration,
}

impl IscDhclient {
    /// Locates `dhclient` and builds the driver with its default artifact
    /// paths under `/run`.
    ///
    /// Fails with [`LeaseError::MissingClient`] when the binary is not on
    /// the search path.
    pub fn new(locator: &dyn BinaryLocator) -> Result<Self, LeaseError> {
        let binary = ClientKind::Dhclient.binary_name();
        let client_path = locator
            .find(binary)
            .ok_or_else(|| LeaseError::MissingClient {
                binary: binary.to_owned(),
            })?;
        Ok(Self {
            client_path,
            lease_file: PathBuf::from(DEFAULT_LEASE_FILE),
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            timeout: ClientKind::Dhclient.default_timeout(),
        })
    }

    /// Overrides the discovery timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Relocates the per-attempt lease and pid artifacts.
    ///
    /// The paths are owned by one attempt at a time; callers serializing
    /// concurrent attempts on different interfaces should give each its
    /// own pair.
    #[must_use]
    pub fn with_artifact_paths(
        mut self,
        lease_file: impl Into<PathBuf>,
        pid_file: impl Into<PathBuf>,
    ) -> Self {
        self.lease_file = lease_file.into();
        self.pid_file = pid_file.into();
        self
    }

    fn handle(&self, interface: &str) -> ProcessHandle {
        // -sf /bin/true disables dhclient-script so no side effects land
        // in resolv.conf or vendor hook directories.
        ProcessHandle::new(&self.client_path)
            .args(["-1", "-v", "-lf"])
            .arg(&self.lease_file)
            .arg("-pf")
            .arg(&self.pid_file)
            .args(["-sf", "/bin/true"])
            .arg(interface)
            .pid_file(&self.pid_file)
            .lease_file(&self.lease_file)
    }
}

impl DhcpClient for IscDhclient {
    fn kind(&self) -> ClientKind {
        ClientKind::Dhclient
    }

    fn newest_lease(&self, _interface: &str) -> Result<Lease, LeaseError> {
        let content = match fs::read_to_string(&self.lease_file) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Lease::default()),
            Err(error) => {
                return Err(LeaseError::InvalidLeaseFile {
                    path: self.lease_file.clone(),
                    detail: error.to_string(),
                });
            }
        };
        let newest = lease::parse_isc_leases(&content).pop().unwrap_or_default();
        Ok(lease::normalize(newest))
    }

    fn parse_static_routes(&self, raw: &str) -> Vec<StaticRoute> {
        routes::parse_rfc3442(raw)
    }

    fn discover(
        &self,
        interface: &str,
        network: &dyn NetworkOps,
        process_table: &dyn ProcessTable,
        sink: Option<&mut OutputSink<'_>>,
    ) -> Result<Lease, LeaseError> {
        debug!(target: DHCLIENT_TARGET, interface, "performing dhcp discovery");
        let handle = self.handle(interface);
        handle.clear_stale_artifacts();

        // dhclient normally relies on the PREINIT hook to bring the link
        // up; with the script disabled that becomes our job.
        network.link_up(interface).map_err(|source| {
            LeaseError::no_lease_caused_by("dhclient", "failed to bring link up", source)
        })?;

        let output = supervisor::run_to_completion(&handle, "dhclient", self.timeout)?;

        let mut reaper = ReapGuard::new("dhclient");
        let missing = supervisor::wait_for_files(
            &[self.pid_file.as_path(), self.lease_file.as_path()],
            self.timeout / 2,
            ARTIFACT_POLL,
        );
        if !missing.is_empty() {
            // Soft failure: no lease was obtainable on this interface
            // within the budget. Documented as an empty lease, not an
            // error, so callers can move on to the next interface.
            warn!(
                target: DHCLIENT_TARGET,
                interface,
                missing = %render_paths(&missing),
                "dhclient did not produce expected files"
            );
            return Ok(Lease::default());
        }

        // Reading the lease before the client daemonizes risks seeing a
        // half-written file; killing it before then risks interrupting
        // the negotiation.
        let wait = supervisor::await_daemonization(
            &self.pid_file,
            process_table,
            self.timeout,
            ARTIFACT_POLL,
        );
        if let Some(pid) = wait.pid {
            reaper.arm_pid(pid);
        }

        if let Some(sink) = sink {
            sink(&output.stdout, &output.stderr);
        }

        let obtained = self.newest_lease(interface)?;
        if obtained.is_empty() {
            return Err(LeaseError::InvalidLeaseFile {
                path: self.lease_file.clone(),
                detail: "no lease blocks found after discovery".to_owned(),
            });
        }
        Ok(obtained)
    }
}

fn render_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
