//! Logging setup for binaries embedding the pipeline.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the defaults; otherwise `info` (or `debug` when
/// `verbose`). `log` records from the recipe loader are bridged into
/// tracing. Calling this twice is harmless: the second call only reports.
pub fn init_logging(json: bool, verbose: bool) {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge already installed: {}", e);
    }

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        )
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(verbose)))
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}
