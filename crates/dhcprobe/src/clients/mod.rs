//! The DHCP client drivers and their selection protocol.
//!
//! Each driver wraps one external client binary's calling convention
//! behind the [`DhcpClient`] capability trait: `dhclient` (isc, legacy
//! lease-file format), `dhcpcd` (lease dumped over stdout), and `udhcpc`
//! (lease emitted as JSON by a companion script). Variant-specific
//! behaviour lives entirely inside the drivers; nothing outside this
//! module branches on the concrete client.

use std::time::Duration;

use tracing::debug;

use crate::error::LeaseError;
use crate::lease::Lease;
use crate::routes::StaticRoute;
use crate::system::{BinaryLocator, NetworkOps, ProcessTable};

mod dhclient;
mod dhcpcd;
mod udhcpc;

pub use self::dhclient::IscDhclient;
pub use self::dhcpcd::Dhcpcd;
pub use self::udhcpc::Udhcpc;

const CLIENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::clients");

/// Receives the captured stdout and stderr of a completed client run.
///
/// Callers that want the raw client chatter (for support bundles or debug
/// logs) pass one to [`DhcpClient::discover`].
pub type OutputSink<'a> = dyn FnMut(&str, &str) + 'a;

/// Static descriptor for one supported DHCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// isc-dhclient, the legacy client with the `lease { ... }` file format.
    Dhclient,
    /// dhcpcd, which dumps its lease in `key='value'` form over stdout.
    Dhcpcd,
    /// BusyBox udhcpc, driven through a companion script that writes JSON.
    Udhcpc,
}

impl ClientKind {
    /// Candidate clients in selection order.
    ///
    /// The order is policy, stable and caller-visible: `dhclient` first
    /// because its lease vocabulary is what downstream consumers were
    /// written against, then `dhcpcd`, then `udhcpc`.
    pub const ALL: [Self; 3] = [Self::Dhclient, Self::Dhcpcd, Self::Udhcpc];

    /// Name of the client binary on the search path.
    #[must_use]
    pub const fn binary_name(self) -> &'static str {
        match self {
            Self::Dhclient => "dhclient",
            Self::Dhcpcd => "dhcpcd",
            Self::Udhcpc => "udhcpc",
        }
    }

    /// Default wall-clock budget for one discovery attempt.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        Duration::from_secs(10)
    }
}

/// One concrete adapter over an external DHCP client binary.
///
/// A driver composes the static-route codec, the lease normalizer, and
/// the process supervisor around one binary's calling convention.
/// Construction doubles as the feasibility probe: it fails with
/// [`LeaseError::MissingClient`] when the binary is absent.
pub trait DhcpClient: std::fmt::Debug {
    /// Which client this driver wraps.
    fn kind(&self) -> ClientKind;

    /// Best-effort read of the most recent lease without starting a new
    /// discovery.
    ///
    /// "No lease yet" is not an error: an absent lease artifact yields an
    /// empty [`Lease`].
    fn newest_lease(&self, interface: &str) -> Result<Lease, LeaseError>;

    /// Parses this client's classless static-route encoding.
    ///
    /// Pure and total: malformed trailing input degrades to the routes
    /// parsed before the first bad token.
    fn parse_static_routes(&self, raw: &str) -> Vec<StaticRoute>;

    /// Performs one full ephemeral lease acquisition on `interface`.
    ///
    /// The interface is brought up through `network`, the client binary is
    /// spawned with its hook scripts disabled, and whatever process it
    /// leaves behind is killed before this call returns. `sink`, when
    /// present, receives the client's captured stdout and stderr.
    ///
    /// Returns an empty [`Lease`] when the expected artifacts never
    /// appeared within the timeout (no lease was obtainable on this
    /// interface), and [`LeaseError::InvalidLeaseFile`] when an artifact
    /// appeared but was empty or unparsable.
    fn discover(
        &self,
        interface: &str,
        network: &dyn NetworkOps,
        process_table: &dyn ProcessTable,
        sink: Option<&mut OutputSink<'_>>,
    ) -> Result<Lease, LeaseError>;
}

/// Constructs the driver for one specific client kind.
///
/// `timeout` overrides the client's default discovery budget.
pub fn build_client(
    kind: ClientKind,
    locator: &dyn BinaryLocator,
    timeout: Option<Duration>,
) -> Result<Box<dyn DhcpClient>, LeaseError> {
    let budget = timeout.unwrap_or_else(|| kind.default_timeout());
    Ok(match kind {
        ClientKind::Dhclient => Box::new(IscDhclient::new(locator)?.with_timeout(budget)),
        ClientKind::Dhcpcd => Box::new(Dhcpcd::new(locator)?.with_timeout(budget)),
        ClientKind::Udhcpc => Box::new(Udhcpc::new(locator)?.with_timeout(budget)),
    })
}

/// Picks the first candidate client whose binary is installed.
///
/// Candidates are probed in [`ClientKind::ALL`] order by attempting
/// construction; the first success wins. When no binary is found the last
/// [`LeaseError::MissingClient`] is propagated.
pub fn select_client(locator: &dyn BinaryLocator) -> Result<Box<dyn DhcpClient>, LeaseError> {
    let mut last_error = None;
    for kind in ClientKind::ALL {
        match build_client(kind, locator, None) {
            Ok(client) => {
                debug!(
                    target: CLIENTS_TARGET,
                    client = kind.binary_name(),
                    "selected dhcp client"
                );
                return Ok(client);
            }
            Err(error) if error.is_missing_client() => {
                debug!(
                    target: CLIENTS_TARGET,
                    client = kind.binary_name(),
                    "dhcp client not installed, trying next candidate"
                );
                last_error = Some(error);
            }
            Err(error) => return Err(error),
        }
    }
    Err(last_error.unwrap_or_else(|| LeaseError::MissingClient {
        binary: ClientKind::Dhclient.binary_name().to_owned(),
    }))
}
