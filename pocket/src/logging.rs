//! Diagnostic tracing for debugging planning and execution.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Task headers and
//! command output are product output and are written through [`crate::Output`],
//! never through tracing.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn`, or `pocket=debug` when `verbose`.
///
/// # Example
/// ```bash
/// RUST_LOG=pocket=trace pok lint
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "warn,pocket=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
