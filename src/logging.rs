//! Global `tracing` subscriber setup.
//!
//! `RUST_LOG` wins when set. Otherwise the configured level is used, which
//! accepts the gateway's classic level names as well as any `EnvFilter`
//! directive.

use crate::config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("Logger initialization error: {0}")]
    Init(String),
}

/// Translate a level name into a filter directive.
///
/// `DEBUG`, `INFO`, `WARNING`, `ERROR` and `CRITICAL` are matched without
/// regard to case; `CRITICAL` maps to `error`. Anything else must already be
/// a valid directive such as `sms_relay=debug,rumqttc=warn`.
pub fn parse_level(level: &str) -> Result<String, LoggingError> {
    let directive = match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        "OFF" => "off",
        _ => {
            let raw = level.trim();
            if raw.is_empty() || EnvFilter::try_new(raw).is_err() {
                return Err(LoggingError::InvalidLevel(level.to_string()));
            }
            return Ok(raw.to_string());
        }
    };
    Ok(directive.to_string())
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let directive = parse_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}
