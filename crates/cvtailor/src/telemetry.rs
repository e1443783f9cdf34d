//! Logging initialization for the worker binary.
//!
//! Events from both `tracing` and the `log` facade end up in one
//! `tracing-subscriber` pipeline. `RUST_LOG` overrides the configured level.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// Installs the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed, so calling
/// this twice is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = build_filter(config)?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(fmt_layer).with(filter);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return Ok(false);
    }

    // A logger may already be registered by an embedding process.
    let _ = tracing_log::LogTracer::init();

    Ok(true)
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level).map_err(|e| ConfigError::Validation {
        message: format!("Invalid logging.level '{}': {}", config.level, e),
    })
}
