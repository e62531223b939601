//! Driver for BusyBox udhcpc, the minimal client.
//!
//! udhcpc has no lease file of its own: every lifecycle event is handed
//! to a script. The driver installs a companion script that serializes
//! the bound lease as JSON to the path named by the `LEASE_FILE`
//! environment variable and exits non-zero for every other event, so a
//! failed negotiation surfaces as a client failure instead of a stale
//! file being read back.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

use tempfile::TempDir;
use tracing::debug;

use crate::clients::{ClientKind, DhcpClient, OutputSink};
use crate::error::LeaseError;
use crate::lease::{self, Lease};
use crate::routes::{self, StaticRoute};
use crate::supervisor::{self, ProcessHandle};
use crate::system::{BinaryLocator, NetworkOps, ProcessTable};

const UDHCPC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::clients::udhcpc");

/// Companion script invoked by udhcpc on every lifecycle event.
///
/// On `bound`/`renew` it writes the lease as JSON to `$LEASE_FILE`; every
/// other event exits non-zero so the supervisor reports a lease error
/// rather than reading a stale artifact.
const UDHCPC_SCRIPT: &str = r#"#!/bin/sh
log() {
    echo "udhcpc[$PPID]" "$interface: $2"
}
[ -z "$1" ] && echo "Error: should be called from udhcpc" && exit 1
case $1 in
    bound|renew)
    cat <<JSON > "$LEASE_FILE"
{
    "interface": "$interface",
    "fixed-address": "$ip",
    "subnet-mask": "$subnet",
    "routers": "${router%% *}",
    "static_routes" : "${staticroutes}"
}
JSON
    ;;
    deconfig)
    log err "Not supported"
    exit 1
    ;;
    leasefail | nak)
    log err "configuration failed: $1: $message"
    exit 1
    ;;
    *)
    echo "$0: Unknown udhcpc command: $1" >&2
    exit 1
    ;;
esac
"#;

/// Driver for the BusyBox `udhcpc` binary.
#[derive(Debug)]
pub struct Udhcpc {
    client_path: PathBuf,
    work_dir: TempDir,
    timeout: Duration,
}

impl Udhcpc {
    /// Locates `udhcpc` and builds the driver with a private scratch
    /// directory for the companion script and lease artifact.
    ///
    /// Fails with [`LeaseError::MissingClient`] when the binary is not on
    /// the search path.
    pub fn new(locator: &dyn BinaryLocator) -> Result<Self, LeaseError> {
        let binary = ClientKind::Udhcpc.binary_name();
        let client_path = locator
            .find(binary)
            .ok_or_else(|| LeaseError::MissingClient {
                binary: binary.to_owned(),
            })?;
        let work_dir = TempDir::new().map_err(|source| {
            LeaseError::no_lease_caused_by(
                "udhcpc",
                "failed to create scratch directory",
                source,
            )
        })?;
        Ok(Self {
            client_path,
            work_dir,
            timeout: ClientKind::Udhcpc.default_timeout(),
        })
    }

    /// Overrides the discovery timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lease artifact path for `interface`, an explicit per-instance
    /// location rather than any shared global.
    fn lease_path(&self, interface: &str) -> PathBuf {
        self.work_dir.path().join(format!("{interface}.lease.json"))
    }

    fn install_script(&self) -> Result<PathBuf, LeaseError> {
        let script = self.work_dir.path().join("udhcpc-script");
        fs::write(&script, UDHCPC_SCRIPT).map_err(|source| {
            LeaseError::no_lease_caused_by("udhcpc", "failed to write companion script", source)
        })?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).map_err(|source| {
            LeaseError::no_lease_caused_by(
                "udhcpc",
                "failed to mark companion script executable",
                source,
            )
        })?;
        Ok(script)
    }
}

impl DhcpClient for Udhcpc {
    fn kind(&self) -> ClientKind {
        ClientKind::Udhcpc
    }

    fn newest_lease(&self, interface: &str) -> Result<Lease, LeaseError> {
        let path = self.lease_path(interface);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Lease::default()),
            Err(error) => {
                return Err(LeaseError::InvalidLeaseFile {
                    path,
                    detail: error.to_string(),
                });
            }
        };
        let options: BTreeMap<String, String> =
            serde_json::from_str(&content).map_err(|error| LeaseError::InvalidLeaseFile {
                path,
                detail: error.to_string(),
            })?;
        Ok(lease::normalize(options))
    }

    fn parse_static_routes(&self, raw: &str) -> Vec<StaticRoute> {
        routes::parse_route_pairs(raw)
    }

    fn discover(
        &self,
        interface: &str,
        network: &dyn NetworkOps,
        _process_table: &dyn ProcessTable,
        sink: Option<&mut OutputSink<'_>>,
    ) -> Result<Lease, LeaseError> {
        debug!(target: UDHCPC_TARGET, interface, "performing dhcp discovery");
        let lease_file = self.lease_path(interface);
        supervisor::clear_stale_artifacts(&[lease_file.as_path()]);

        // udhcpc assumes the interface is already up when invoked with a
        // custom script.
        network.link_up(interface).map_err(|source| {
            LeaseError::no_lease_caused_by("udhcpc", "failed to bring link up", source)
        })?;

        let script = self.install_script()?;
        let handle = ProcessHandle::new(&self.client_path)
            .args(["-O", "staticroutes", "-i"])
            .arg(interface)
            .arg("-s")
            .arg(&script)
            .arg("-n") // exit if lease is not obtained
            .arg("-q") // exit after obtaining lease
            .arg("-f") // run in foreground
            .arg("-v")
            .env("LEASE_FILE", &lease_file)
            .lease_file(&lease_file)
            .config_file(&script);

        let output = supervisor::run_to_completion(&handle, "udhcpc", self.timeout)?;
        if let Some(sink) = sink {
            sink(&output.stdout, &output.stderr);
        }

        let obtained = self.newest_lease(interface)?;
        if obtained.is_empty() {
            return Err(LeaseError::InvalidLeaseFile {
                path: lease_file,
                detail: "companion script produced no lease".to_owned(),
            });
        }
        Ok(obtained)
    }
}
