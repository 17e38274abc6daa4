//! SMS Relay Library
//!
//! Store-and-forward gateway that reads inbound SMS from a cellular modem,
//! parks them in a Redis list and republishes them on an MQTT bus.
//!
//! # Modules
//!
//! - `port`: Port abstraction layer for serial communication
//! - `modem`: AT command session, list-reply parser and modem discovery
//! - `message`: Parsed SMS records and the queue wire format
//! - `queue`: Relay queue trait with Redis and in-memory backends
//! - `publisher`: MQTT publisher with background reconnection
//! - `relay`: Ingestion and delivery loops
//! - `http`: HTTP POST delivery (when `http-sender` feature is enabled)
//! - `gateway`: Wiring of the above into a running process
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//! - `error`: Top-level error handling

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod message;
pub mod modem;
pub mod port;
pub mod publisher;
pub mod queue;
pub mod relay;

#[cfg(feature = "http-sender")]
pub mod http;

// Re-export commonly used types for convenience
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use message::{RecordStatus, RelayRecord, SmsMessage};
pub use modem::{ModemSession, PortProber, SessionState};
pub use port::{MockSerialPort, PortError, SerialPortAdapter, SyncSerialPort};
pub use publisher::{ConnectionState, Publisher};
pub use queue::{MemoryQueue, RedisQueue, RelayQueue};
pub use relay::{DeliveryFailurePolicy, DeliveryOutcome, DeliverySink};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
