//! Tracing setup for binaries embedding the server.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `info`. Fails if a global subscriber is already set.
pub fn init() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish()
        .try_init()
}
