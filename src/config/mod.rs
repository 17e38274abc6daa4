//! Configuration module for the SMS relay.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SMS_RELAY_CONFIG` environment variable (explicit path)
//! 2. `./sms-relay.toml` (current directory)
//! 3. `~/.config/sms-relay/config.toml` (XDG on Linux)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Values can be overridden via environment variables named
//! `SMS_RELAY_<SECTION>_<KEY>`, e.g. `SMS_RELAY_BUS_HOST=broker.lan` or
//! `SMS_RELAY_QUEUE_NAME=inbound`. Command-line flags are applied last.
//!
//! # Example
//!
//! ```rust,no_run
//! use sms_relay::config::ConfigLoader;
//!
//! let config = ConfigLoader::load()?.into_config();
//! config.validate()?;
//! println!("Relaying via {}:{}", config.queue.host, config.queue.port);
//! # Ok::<(), sms_relay::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{
    BusConfig, Config, HttpConfig, LogFormat, LoggingConfig, ModemConfig, QueueConfig,
    RelayConfig, SinkKind,
};
