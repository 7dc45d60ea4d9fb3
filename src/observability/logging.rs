//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem from `log` config
//! - Honour the `mute` switch
//! - Configure the filter from config, environment, or a default

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Initialize the tracing subscriber from logging config.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// When `mute` is set, nothing is installed and events are discarded.
pub fn init_logging(config: &LogConfig) {
    if config.mute {
        return;
    }

    let filter = match &config.filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("switchboard=info")),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
