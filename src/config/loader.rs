//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SMS_RELAY";

/// Config file name inside the user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "sms-relay.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SMS_RELAY_CONFIG";

/// Application directory under the platform config dir
const APP_DIR: &str = "sms-relay";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SMS_RELAY_CONFIG` environment variable (explicit path)
    /// 2. `./sms-relay.toml` (current directory)
    /// 3. `<config dir>/sms-relay/config.toml` (`$XDG_CONFIG_HOME` on Linux)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    ///
    /// Unlike [`ConfigLoader::load`], a missing file is an error.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Default location of the user config file.
pub fn get_default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.config_dir().join(APP_DIR).join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn env_var(key: &str) -> Option<(String, String)> {
    let var = format!("{}_{}", ENV_PREFIX, key);
    std::env::var(&var).ok().map(|value| (var, value))
}

fn parse_value<T: FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(var, format!("Invalid {}", what)))
}

/// Parse a lowercase enum name the same way the TOML file would.
fn parse_enum<T: DeserializeOwned>(var: &str, value: &str) -> ConfigResult<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|e| ConfigError::env_parse(var, e.to_string()))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SMS_RELAY_<SECTION>_<KEY>`
/// For example:
/// - `SMS_RELAY_MODEM_PORT=/dev/ttyUSB2`
/// - `SMS_RELAY_QUEUE_NAME=inbound_sms`
/// - `SMS_RELAY_RELAY_ON_DELIVERY_FAILURE=requeue`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Modem overrides
    if let Some((_, val)) = env_var("MODEM_PORT") {
        config.modem.port = Some(val).filter(|p| !p.is_empty());
    }
    if let Some((var, val)) = env_var("MODEM_BAUD_RATE") {
        config.modem.baud_rate = parse_value(&var, &val, "baud rate")?;
    }
    if let Some((var, val)) = env_var("MODEM_COMMAND_TIMEOUT_MS") {
        config.modem.command_timeout_ms = parse_value(&var, &val, "timeout")?;
    }
    if let Some((var, val)) = env_var("MODEM_PROBE_WAIT_MS") {
        config.modem.probe_wait_ms = parse_value(&var, &val, "timeout")?;
    }
    if let Some((_, val)) = env_var("MODEM_EXCLUDE_PORTS") {
        config.modem.exclude_ports = val
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
    }

    // Queue overrides
    if let Some((_, val)) = env_var("QUEUE_HOST") {
        config.queue.host = val;
    }
    if let Some((var, val)) = env_var("QUEUE_PORT") {
        config.queue.port = parse_value(&var, &val, "port number")?;
    }
    if let Some((_, val)) = env_var("QUEUE_NAME") {
        config.queue.name = val;
    }
    if let Some((var, val)) = env_var("QUEUE_POP_TIMEOUT_MS") {
        config.queue.pop_timeout_ms = parse_value(&var, &val, "timeout")?;
    }

    // Bus overrides
    if let Some((_, val)) = env_var("BUS_HOST") {
        config.bus.host = val;
    }
    if let Some((var, val)) = env_var("BUS_PORT") {
        config.bus.port = parse_value(&var, &val, "port number")?;
    }
    if let Some((_, val)) = env_var("BUS_CLIENT_ID") {
        config.bus.client_id = val;
    }
    if let Some((_, val)) = env_var("BUS_NAMESPACE") {
        config.bus.namespace = val;
    }
    if let Some((var, val)) = env_var("BUS_QOS") {
        config.bus.qos = parse_value(&var, &val, "QoS level")?;
    }
    if let Some((var, val)) = env_var("BUS_RECONNECT_INTERVAL_MS") {
        config.bus.reconnect_interval_ms = parse_value(&var, &val, "interval")?;
    }
    if let Some((var, val)) = env_var("BUS_PUBLISH_WAIT_MS") {
        config.bus.publish_wait_ms = Some(parse_value(&var, &val, "timeout")?);
    }

    // Relay overrides
    if let Some((var, val)) = env_var("RELAY_POLL_INTERVAL_MS") {
        config.relay.poll_interval_ms = parse_value(&var, &val, "interval")?;
    }
    if let Some((var, val)) = env_var("RELAY_ON_DELIVERY_FAILURE") {
        config.relay.on_delivery_failure = parse_enum(&var, &val)?;
    }
    if let Some((var, val)) = env_var("RELAY_SINK") {
        config.relay.sink = parse_enum(&var, &val)?;
    }

    // HTTP overrides
    if let Some((_, val)) = env_var("HTTP_URL") {
        config.http.url = Some(val);
    }
    if let Some((_, val)) = env_var("HTTP_AUTH_TOKEN") {
        config.http.auth_token = Some(val);
    }

    // Logging overrides
    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some((var, val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = parse_enum(&var, &val)?;
    }

    Ok(())
}
