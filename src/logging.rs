//! Structured logging via `tracing-subscriber`
//!
//! Records go to stderr so stdout stays reserved for JSON envelopes and the
//! MCP protocol stream. `SCHEMATA_LOG` overrides the configured filter with a
//! full `EnvFilter` directive string.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LogSettings};
use crate::error::{Result, SchemataError};

/// Environment variable holding a full filter directive
pub const LOG_FILTER_ENV: &str = "SCHEMATA_LOG";

/// Chatty dependencies capped regardless of the base level
const NOISY_TARGETS: &[(&str, &str)] = &[("tokio_postgres", "warn"), ("deadpool", "warn")];

/// Build the filter from the base level plus dependency caps
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    let mut directives = vec![level.to_string()];
    directives.extend(NOISY_TARGETS.iter().map(|(target, lvl)| format!("{target}={lvl}")));

    let filter = directives.join(",");
    EnvFilter::try_new(&filter)
        .map_err(|e| SchemataError::config_error(format!("Invalid log filter '{filter}': {e}")))
}

/// Install the global subscriber
///
/// # Errors
/// `ConfigError` if the filter does not parse or a subscriber is already installed.
pub fn init(settings: &LogSettings) -> Result<()> {
    let filter = match std::env::var(LOG_FILTER_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
            .map_err(|e| {
                SchemataError::config_error(format!("Invalid {LOG_FILTER_ENV} filter: {e}"))
            })?,
        _ => build_env_filter(&settings.level)?,
    };

    let layer = match settings.format {
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| SchemataError::config_error(format!("Could not initialize logging: {e}")))
}
