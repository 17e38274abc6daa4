//! Bus connection state, published by the supervisor over a watch channel.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial handshake in progress.
    Connecting,

    /// CONNACK received; publishes go straight out.
    Connected,

    /// Connection lost. `attempt` counts failed reconnects since the last
    /// successful one.
    Reconnecting { attempt: u32 },

    /// Publisher shut down. Terminal.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting { .. } => "Reconnecting",
            ConnectionState::Closed => "Closed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "Reconnecting (attempt {attempt})")
            }
            other => f.write_str(other.as_str()),
        }
    }
}
