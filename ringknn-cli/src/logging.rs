//! Logging for the ringknn CLI.
//!
//! Rank diagnostics and pipeline span timings go to stderr through
//! `tracing`, keeping the driver's timing and accuracy lines on stdout
//! machine-readable. Verbosity is controlled by `RUST_LOG` and defaults
//! to `info`.

use std::io;
use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Error raised when the global tracing subscriber cannot be installed.
#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {source}")]
pub struct LoggingError {
    /// Error raised by `tracing_subscriber`.
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

/// Installs the process-wide subscriber; later calls are no-ops.
///
/// Span close events carry the elapsed time of every pipeline span, so
/// `RUST_LOG=ringknn_core=debug` shows each ring step as it drains
/// without doubling the output into open/close pairs.
///
/// # Errors
/// Returns [`LoggingError`] when another subscriber already owns the
/// global slot.
pub fn init_logging() -> Result<(), LoggingError> {
    if INSTALLED.set(()).is_err() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|source| LoggingError { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging().expect("logging must initialise");
        init_logging().expect("subsequent calls must be no-ops");
    }
}
