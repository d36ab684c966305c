//! Diagnostics for shiki commands.
//!
//! Tracing output goes to stderr so stdout stays machine-readable
//! (`shiki route` prints the engine name there, `shiki dag render` the graph).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` with
/// `--verbose`.
///
/// # Example
/// ```bash
/// RUST_LOG=shiki=debug shiki worktree merge --branch shiki/task-T-1
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
