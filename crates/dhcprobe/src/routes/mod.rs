//! Classless static-route codecs.
//!
//! Two grammars exist for the `static_routes` lease value and each driver
//! uses exactly one. `dhclient` leases carry the RFC 3442 token encoding,
//! where the number of destination octets depends on the prefix length;
//! `dhcpcd` and `udhcpc` emit ready-made `destination/prefix gateway`
//! pairs. Both parsers are total: malformed trailing input degrades to the
//! routes parsed before the first bad token, with a diagnostic, and never
//! fails.

use tracing::{error, warn};

const ROUTES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::routes");

/// One classless static route: a destination network and its gateway.
///
/// The destination is a dotted-decimal network in CIDR notation (for
/// example `169.254.169.254/32`); the gateway is a plain dotted-decimal
/// address. Route order is meaningful to callers applying them, so parsed
/// sequences preserve the source ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    destination: String,
    gateway: String,
}

impl StaticRoute {
    /// Builds a route from a destination CIDR and a gateway address.
    #[must_use]
    pub fn new(destination: impl Into<String>, gateway: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            gateway: gateway.into(),
        }
    }

    /// Destination network in CIDR notation.
    #[must_use]
    pub fn destination(&self) -> &str {
        self.destination.as_str()
    }

    /// Gateway address for the destination network.
    #[must_use]
    pub fn gateway(&self) -> &str {
        self.gateway.as_str()
    }
}

/// Number of significant destination octets for an RFC 3442 prefix length.
///
/// Returns `None` for prefix lengths outside `0..=32`.
const fn destination_octets(prefix: u8) -> Option<usize> {
    match prefix {
        25..=32 => Some(4),
        17..=24 => Some(3),
        9..=16 => Some(2),
        1..=8 => Some(1),
        0 => Some(0),
        _ => None,
    }
}

/// Parses the RFC 3442 classless static-route encoding used by `dhclient`.
///
/// Accepts both the comma-separated isc encoding and the dot/space
/// separated `dhcpcd` variant: the raw string is split on commas, spaces,
/// and dots into a flat token sequence. Each route is one prefix-length
/// token, a prefix-dependent number of destination octets (right-padded
/// with zeroes to four), and exactly four gateway octets.
///
/// ```rust
/// use dhcprobe::routes::parse_rfc3442;
///
/// let routes = parse_rfc3442("32,169,254,169,254,130,56,248,255,0,130,56,240,1");
/// assert_eq!(routes.len(), 2);
/// assert_eq!(routes.first().map(|r| r.destination()), Some("169.254.169.254/32"));
/// ```
///
/// Truncated or malformed input yields the routes accumulated before the
/// first bad token; the remainder is reported through a diagnostic.
#[must_use]
pub fn parse_rfc3442(raw: &str) -> Vec<StaticRoute> {
    // Raw strings from a dhclient lease may end in a semicolon.
    let trimmed = raw.trim_end_matches(';');
    let tokens: Vec<&str> = trimmed
        .split([',', ' ', '.'])
        .filter(|token| !token.is_empty())
        .collect();

    let mut routes = Vec::new();
    let mut cursor = 0;
    while let Some(token) = tokens.get(cursor) {
        let Ok(prefix) = token.parse::<u8>() else {
            error!(
                target: ROUTES_TARGET,
                token,
                raw = trimmed,
                "rfc3442 prefix length is not a number"
            );
            return routes;
        };
        let Some(octets) = destination_octets(prefix) else {
            error!(
                target: ROUTES_TARGET,
                prefix,
                raw = trimmed,
                "rfc3442 prefix length out of range"
            );
            return routes;
        };

        // Prefix token, destination octets, then always four gateway octets.
        let required = 1 + octets + 4;
        let Some(consumed) = tokens.get(cursor + 1..cursor + required) else {
            error!(
                target: ROUTES_TARGET,
                prefix,
                required,
                remaining = tokens.len() - cursor,
                raw = trimmed,
                "rfc3442 string truncated mid-route"
            );
            return routes;
        };
        let (destination, gateway) = consumed.split_at(octets);

        let mut padded: Vec<&str> = destination.to_vec();
        padded.resize(4, "0");
        routes.push(StaticRoute::new(
            format!("{}/{prefix}", padded.join(".")),
            gateway.join("."),
        ));
        cursor += required;
    }
    routes
}

/// Parses the whitespace pair encoding used by `dhcpcd` and `udhcpc`.
///
/// The raw string alternates `destination/prefix` and `gateway` tokens
/// with no further decoding required. An empty or odd-length token list is
/// malformed and yields an empty result.
#[must_use]
pub fn parse_route_pairs(raw: &str) -> Vec<StaticRoute> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.is_empty() || !tokens.len().is_multiple_of(2) {
        warn!(
            target: ROUTES_TARGET,
            raw,
            "malformed classless static routes"
        );
        return Vec::new();
    }
    tokens
        .chunks_exact(2)
        .filter_map(|pair| match pair {
            [destination, gateway] => Some(StaticRoute::new(*destination, *gateway)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests;
