//! Top-level error taxonomy.
//!
//! Only startup failures reach `main`; steady-state failures are contained
//! in the relay loops and logged there.

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::modem::DiscoveryError;
use crate::publisher::PublishError;
use crate::queue::QueueError;
use crate::relay::RelayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No modem could be found or the port list could not be read.
    #[error("Modem discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Serial, queue or bus I/O failed.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// A relay step failed.
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// A background task panicked or could not be joined.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<PublishError> for GatewayError {
    fn from(e: PublishError) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

impl From<QueueError> for GatewayError {
    fn from(e: QueueError) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
