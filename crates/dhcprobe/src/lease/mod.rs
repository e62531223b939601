//! The canonical lease model and the per-client parsers feeding it.
//!
//! Each DHCP client writes its lease in a different on-disk or stdout
//! vocabulary. This module parses those formats into plain string maps and
//! normalizes them onto one canonical schema, so downstream consumers
//! never see a client-specific alias such as `ip-address` or
//! `classless-static-routes`.

use std::collections::BTreeMap;

use serde::Serialize;

/// Canonical key for the leased IPv4 address.
pub const FIXED_ADDRESS: &str = "fixed-address";
/// Canonical key for the subnet mask.
pub const SUBNET_MASK: &str = "subnet-mask";
/// Canonical key for the default routers.
pub const ROUTERS: &str = "routers";
/// Canonical key for the interface the lease was obtained on.
pub const INTERFACE: &str = "interface";
/// Canonical key for the still-encoded classless static routes.
///
/// The value keeps its client-native encoding and is re-parsed on demand
/// through [`DhcpClient::parse_static_routes`](crate::DhcpClient::parse_static_routes).
pub const STATIC_ROUTES: &str = "static_routes";

/// An immutable mapping of canonical lease option names to values.
///
/// A `Lease` is produced fresh on every discovery attempt and never
/// mutated afterwards. Keys a client emitted beyond the canonical set pass
/// through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Lease {
    options: BTreeMap<String, String>,
}

impl Lease {
    /// Looks up a lease option by its canonical key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Whether the lease carries no options at all.
    ///
    /// An empty lease is the soft "no lease obtained in time" outcome of a
    /// discovery attempt.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Number of options in the lease.
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Iterates over all `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Interface the lease was obtained on.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.get(INTERFACE)
    }

    /// The leased IPv4 address.
    #[must_use]
    pub fn fixed_address(&self) -> Option<&str> {
        self.get(FIXED_ADDRESS)
    }

    /// The subnet mask of the leased address.
    #[must_use]
    pub fn subnet_mask(&self) -> Option<&str> {
        self.get(SUBNET_MASK)
    }

    /// The default routers offered with the lease.
    #[must_use]
    pub fn routers(&self) -> Option<&str> {
        self.get(ROUTERS)
    }

    /// The classless static routes, still in their client-native encoding.
    #[must_use]
    pub fn static_routes(&self) -> Option<&str> {
        self.get(STATIC_ROUTES)
    }
}

impl From<BTreeMap<String, String>> for Lease {
    fn from(options: BTreeMap<String, String>) -> Self {
        Self { options }
    }
}

/// Rewrites a client-native option map onto the canonical schema.
///
/// Underscore-delimited keys become hyphen-delimited, then the known
/// aliases are renamed: `ip-address` to [`FIXED_ADDRESS`] and
/// `classless-static-routes` to [`STATIC_ROUTES`]. The canonical
/// `static_routes` key itself contains an underscore, so the rename table
/// also maps its hyphenated form back, making normalization idempotent.
/// Unknown keys pass through unchanged; normalization never fails.
#[must_use]
pub fn normalize(options: BTreeMap<String, String>) -> Lease {
    let mut canonical = BTreeMap::new();
    for (key, value) in options {
        let hyphenated = key.replace('_', "-");
        let renamed = match hyphenated.as_str() {
            "ip-address" => FIXED_ADDRESS.to_owned(),
            "classless-static-routes" | "static-routes" => STATIC_ROUTES.to_owned(),
            _ => hyphenated,
        };
        canonical.insert(renamed, value);
    }
    Lease::from(canonical)
}

/// Parses the content of an isc-dhclient lease file.
///
/// The file holds one or more `lease { ... }` blocks; within a block,
/// entries are semicolon-separated `option name value` or `key value`
/// lines with surrounding double quotes stripped. Blocks are returned in
/// file order, so the most recent lease is last. Empty content yields an
/// empty list.
#[must_use]
pub fn parse_isc_leases(content: &str) -> Vec<BTreeMap<String, String>> {
    let mut leases = Vec::new();
    let mut cursor = 0;
    while let Some(remainder) = content.get(cursor..) {
        let Some(open) = remainder.find("lease {") else {
            break;
        };
        let body_start = open + "lease {".len();
        let Some(body) = remainder.get(body_start..) else {
            break;
        };
        let Some(close) = body.find('}') else {
            break;
        };
        if let Some(block) = body.get(..close) {
            leases.push(parse_isc_lease_block(block));
        }
        cursor += body_start + close + 1;
    }
    leases
}

fn parse_isc_lease_block(block: &str) -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    for entry in block.split(';') {
        // Strip newlines and double quotes; drop the leading `option`
        // keyword without touching values that happen to contain it.
        let unquoted = entry.trim().replace('"', "");
        let line = unquoted.strip_prefix("option ").unwrap_or(&unquoted);
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(' ') {
            options.insert(key.to_owned(), value.trim().to_owned());
        }
    }
    options
}

/// Parses the output of `dhcpcd --dumplease` into a normalized [`Lease`].
///
/// The dump is one `key='value'` line per option, single quotes included.
/// The interface is not part of the dump and is injected before
/// normalization. A dump with no options at all yields an empty lease,
/// with no interface injected, so "nothing to dump" stays observable.
#[must_use]
pub fn parse_dhcpcd_dump(dump: &str, interface: &str) -> Lease {
    let mut options = BTreeMap::new();
    for line in dump.trim().lines() {
        let unquoted = line.replace('\'', "");
        if let Some((key, value)) = unquoted.split_once('=') {
            options.insert(key.to_owned(), value.to_owned());
        }
    }
    if options.is_empty() {
        return Lease::default();
    }
    options.insert(INTERFACE.to_owned(), interface.to_owned());
    normalize(options)
}

#[cfg(test)]
mod tests;
