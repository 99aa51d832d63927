//! Diagnostic logging.
//!
//! Progress lines go to stdout through [`crate::output`]. Everything else
//! (freshness decisions, cleanup, skipped configuration nodes, the error
//! that aborted a run) is emitted with `tracing` and written to stderr.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber.
///
/// `verbose` lowers the default level from `warn` to `debug`; `RUST_LOG`
/// overrides both. With `json`, every record is one JSON object per line.
pub fn init(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}
