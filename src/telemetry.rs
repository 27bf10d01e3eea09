//! Tracing bootstrap for binaries and tests.

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
