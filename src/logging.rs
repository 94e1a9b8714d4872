// Logging setup
//
// tracing-subscriber initialization with env-filter support. RUST_LOG
// takes precedence over the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber
///
/// Safe to call more than once; later calls are no-ops. The format is one
/// of `json`, `pretty`, or `compact` (the default).
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber was already initialized");
    }
}
