//! Structured logging setup for embedders.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize structured logging.
///
/// `RUST_LOG` overrides the configured level. Safe to call more than
/// once; only the first call installs a subscriber.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}
