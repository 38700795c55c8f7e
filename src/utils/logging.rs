//! Logging bootstrap.
//!
//! `RUST_LOG` wins when it is set and parses; otherwise the configured
//! `log.level` applies to everything.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global `tracing` subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Normalize a configured level name. Unknown names map to `info`.
pub(crate) fn level_directive(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "off" => "off",
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}
