//! Configuration schema definitions.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! gateway that polls the first modem found and relays through a local Redis
//! to a local MQTT broker.

use super::error::{ConfigError, ConfigResult};
use crate::port::PortSettings;
use crate::relay::DeliveryFailurePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub modem: ModemConfig,
    pub queue: QueueConfig,
    pub bus: BusConfig,
    pub relay: RelayConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.modem.baud_rate == 0 {
            return Err(ConfigError::validation(
                "modem.baud_rate",
                "must be greater than zero",
            ));
        }
        if self.modem.command_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "modem.command_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.queue.name.trim().is_empty() {
            return Err(ConfigError::validation("queue.name", "must not be empty"));
        }
        if self.bus.namespace.trim_matches('/').trim().is_empty() {
            return Err(ConfigError::validation("bus.namespace", "must not be empty"));
        }
        if self.bus.qos > 2 {
            return Err(ConfigError::validation("bus.qos", "must be 0, 1 or 2"));
        }
        if self.relay.sink == SinkKind::Http && self.http.url.is_none() {
            return Err(ConfigError::validation(
                "http.url",
                "required when relay.sink = \"http\"",
            ));
        }
        Ok(())
    }
}

/// Serial modem section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Fixed port. Discovery runs when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Time allowed for a final result code.
    pub command_timeout_ms: u64,
    /// Timeout of a single serial read.
    pub read_timeout_ms: u64,
    /// Pause between reads while a reply is pending.
    pub read_poll_ms: u64,
    /// Time a discovery candidate gets to answer `AT`.
    pub probe_wait_ms: u64,
    /// Ports discovery never touches.
    pub exclude_ports: Vec<String>,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            command_timeout_ms: 5_000,
            read_timeout_ms: 100,
            read_poll_ms: 10,
            probe_wait_ms: 500,
            exclude_ports: Vec::new(),
        }
    }
}

impl ModemConfig {
    pub fn port_settings(&self) -> PortSettings {
        PortSettings::new(self.baud_rate, Duration::from_millis(self.read_timeout_ms))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    pub fn probe_wait(&self) -> Duration {
        Duration::from_millis(self.probe_wait_ms)
    }
}

/// Relay queue (Redis) section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    /// Name of the Redis list.
    pub name: String,
    /// Longest a single blocking pop waits. Zero waits forever.
    pub pop_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            name: "sms_queue".to_string(),
            pop_timeout_ms: 1_000,
        }
    }
}

impl QueueConfig {
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }
}

/// Message bus (MQTT) section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    /// Empty means a random `sms-relay-<id>` per process.
    pub client_id: String,
    /// First topic level of every published message.
    pub namespace: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    /// Upper bound on how long `publish` waits for a lost connection.
    /// Unset waits until it is back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_wait_ms: Option<u64>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            namespace: "modem".to_string(),
            qos: 1,
            keep_alive_secs: 30,
            connect_timeout_ms: 10_000,
            reconnect_interval_ms: 5_000,
            publish_wait_ms: None,
        }
    }
}

impl BusConfig {
    pub fn effective_client_id(&self) -> String {
        if self.client_id.is_empty() {
            format!("sms-relay-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
        } else {
            self.client_id.clone()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn publish_wait(&self) -> Option<Duration> {
        self.publish_wait_ms.map(Duration::from_millis)
    }
}

/// Where the delivery loop sends records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Mqtt,
    Http,
}

/// Loop timing and failure handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub poll_interval_ms: u64,
    pub ingest_backoff_ms: u64,
    pub delivery_backoff_ms: u64,
    pub on_delivery_failure: DeliveryFailurePolicy,
    pub sink: SinkKind,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            ingest_backoff_ms: 5_000,
            delivery_backoff_ms: 5_000,
            on_delivery_failure: DeliveryFailurePolicy::Drop,
            sink: SinkKind::Mqtt,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ingest_backoff(&self) -> Duration {
        Duration::from_millis(self.ingest_backoff_ms)
    }

    pub fn delivery_backoff(&self) -> Duration {
        Duration::from_millis(self.delivery_backoff_ms)
    }
}

/// HTTP delivery section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Sent as `Authorization: Bearer <token>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub timeout_ms: u64,
    /// Extra JSON fields added to every request body.
    pub extra: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            timeout_ms: 10_000,
            extra: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL (any case), or a tracing
    /// filter directive.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARNING".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}
