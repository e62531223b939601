//! The closed error taxonomy for lease acquisition.
//!
//! Every variant means "no lease was obtained"; callers are expected to
//! match broadly and treat any of them as "try another interface or
//! client". [`LeaseError::MissingClient`] additionally participates in the
//! driver selection fallback: it is raised at driver construction when the
//! client binary is absent, telling the selector to advance to the next
//! candidate.
//!
//! Parsing functions never return these errors; malformed route or lease
//! text degrades to a partial or empty result with a diagnostic, because
//! partial routing information is more useful to a caller than total
//! failure. Process supervision failures do fail, and kill failures are
//! logged but never escalated.

use std::error::Error;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while acquiring a DHCP lease.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The client binary was not found on the search path.
    ///
    /// Raised at driver construction; construction doubles as the
    /// feasibility probe used by [`select_client`](crate::select_client).
    #[error("no '{binary}' binary found on the search path")]
    MissingClient {
        /// Name of the binary that was searched for.
        binary: String,
    },

    /// No usable network interface was available for discovery.
    ///
    /// Raised by the caller layer before discovery is attempted.
    #[error("no viable interface for dhcp discovery")]
    NoViableInterface,

    /// A lease artifact was empty, absent, or unparsable after the
    /// supervision sequence otherwise completed.
    #[error("invalid lease artifact '{}': {detail}", path.display())]
    InvalidLeaseFile {
        /// Path of the offending artifact.
        path: PathBuf,
        /// Description of what was wrong with it.
        detail: String,
    },

    /// The client failed before a lease could be read: spawn failure,
    /// non-zero exit, hard timeout, or a collaborator error.
    #[error("{client} failed to obtain a lease: {detail}")]
    NoLease {
        /// Name of the client binary that was driven.
        client: &'static str,
        /// Human-readable failure description.
        detail: String,
        /// Optional underlying cause.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
}

impl LeaseError {
    /// Builds a [`LeaseError::NoLease`] without an underlying cause.
    #[must_use]
    pub fn no_lease(client: &'static str, detail: impl Into<String>) -> Self {
        Self::NoLease {
            client,
            detail: detail.into(),
            source: None,
        }
    }

    /// Builds a [`LeaseError::NoLease`] wrapping an underlying cause.
    #[must_use]
    pub fn no_lease_caused_by(
        client: &'static str,
        detail: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::NoLease {
            client,
            detail: detail.into(),
            source: Some(source.into()),
        }
    }

    /// Whether this error signals an absent client binary.
    ///
    /// The selection protocol uses this to advance to the next candidate
    /// driver instead of aborting.
    #[must_use]
    pub const fn is_missing_client(&self) -> bool {
        matches!(self, Self::MissingClient { .. })
    }
}
