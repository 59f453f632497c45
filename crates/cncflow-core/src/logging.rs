//! Logging initialization.

use crate::error::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging for the process.
///
/// Respects `RUST_LOG`; defaults to `info` with the cncflow crates at
/// `debug`. Call once per process.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cncflow_core=debug,cncflow_tinyg=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::other(format!("failed to install tracing subscriber: {}", e)))
}
