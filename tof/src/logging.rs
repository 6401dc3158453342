//! Diagnostic tracing for the engine and CLI.
//!
//! Task history lives in the store; tracing output is stderr-only and is not
//! persisted.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn,tof=info";

/// Install the global subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn,tof=info`. Output is compact on
/// stderr so stdout stays free for command results.
///
/// ```bash
/// RUST_LOG=tof=debug tof prompt "install package x"
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
