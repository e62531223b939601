//! Structured telemetry initialisation for the CLI.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first invocation.
///
/// Diagnostics go to stderr so the rendered lease on stdout stays
/// machine-readable. Repeated calls are idempotent: subsequent
/// invocations leave the existing registration untouched.
pub fn initialise(log_filter: &str) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(log_filter))
        .map(|()| ())
}

fn install_subscriber(log_filter: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(log_filter)
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        // Avoid stray colour codes in non-TTY sinks while keeping colour
        // on interactive terminals.
        .with_ansi(io::stderr().is_terminal())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
