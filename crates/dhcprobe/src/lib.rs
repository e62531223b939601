//! Ephemeral DHCP lease acquisition for pre-boot environments.
//!
//! The `dhcprobe` crate obtains a single IPv4 lease by driving an external
//! DHCP client binary before any init scripts or network managers are
//! available. It does not speak DHCP itself: each supported client
//! (`dhclient`, `dhcpcd`, `udhcpc`) is wrapped by a driver that spawns the
//! binary with its hook scripts disabled, supervises the resulting process,
//! and parses the client's native lease artifact into one canonical
//! [`Lease`] schema.
//!
//! # Architecture
//!
//! - [`clients`] — the [`DhcpClient`] capability trait, the three concrete
//!   drivers, and the ordered selection protocol.
//! - [`supervisor`] — spawn-without-hooks, artifact polling, daemonization
//!   detection, and unconditional teardown of the spawned client.
//! - [`lease`] / [`routes`] — lease normalization and the two classless
//!   static-route grammars.
//! - [`system`] — trait seams for the OS collaborators (link management,
//!   process-table introspection, binary location) so discovery can be
//!   exercised without root or real daemons.
//!
//! # Example
//!
//! ```rust,no_run
//! use dhcprobe::clients::select_client;
//! use dhcprobe::system::{Iproute2, PathSearch, ProcFs};
//!
//! # fn main() -> Result<(), dhcprobe::LeaseError> {
//! let client = select_client(&PathSearch)?;
//! let lease = client.discover("eth0", &Iproute2, &ProcFs, None)?;
//! let address = lease.fixed_address();
//! drop(address);
//! # Ok(())
//! # }
//! ```

pub mod clients;
pub mod error;
pub mod lease;
pub mod routes;
pub mod supervisor;
pub mod system;

pub use self::clients::{ClientKind, DhcpClient, build_client, select_client};
pub use self::error::LeaseError;
pub use self::lease::Lease;
pub use self::routes::StaticRoute;
