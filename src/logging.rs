use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to stderr
/// because stdout carries the balances CSV.
pub fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        let stderr_layer = fmt::layer()
            .json()
            .with_target(true) // Keep target in JSON for structured queries
            .with_writer(io::stderr)
            .with_ansi(false);
        registry.with(stderr_layer).init();
    } else {
        let stderr_layer = fmt::layer().with_target(false).with_writer(io::stderr);
        registry.with(stderr_layer).init();
    }
}
