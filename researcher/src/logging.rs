//! Diagnostic tracing for research runs.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. The report itself is
//! printed to stdout and persisted by `io::run_log`, so neither is affected by
//! the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "researcher=info,warn";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `researcher=info,warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=researcher=debug researcher run "What is QUIC?"
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
