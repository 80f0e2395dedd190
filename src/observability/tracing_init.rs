//! Process-wide `tracing` subscriber initialization.

use super::LoggingConfig;
use super::logging::LogFormat;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: OnceLock<()> = OnceLock::new();

/// Installs the global `tracing` subscriber, reading format and filter
/// settings from the environment (see [`LoggingConfig::from_env`]).
///
/// Idempotent: later calls within the same process are no-ops, matching the
/// process-wide-singleton treatment the rest of the engine gives its
/// long-lived resources.
pub fn init() {
    INIT.get_or_init(|| {
        let config = LoggingConfig::from_env();
        let filter = EnvFilter::try_new(&config.filter_directive)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);

        match config.format {
            LogFormat::Json => {
                let _ = registry
                    .with(tracing_subscriber::fmt::layer().json().with_target(true))
                    .try_init();
            }
            LogFormat::Pretty => {
                let _ = registry
                    .with(tracing_subscriber::fmt::layer().with_target(false))
                    .try_init();
            }
        }
    });
}
