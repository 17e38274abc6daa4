//! Command session with one physical modem.
//!
//! The session owns the serial connection and moves through three states:
//!
//! ```text
//! Disconnected --open--> ConnectedUninitialized --AT+CMGF=1--> Ready
//!       ^                                                        |
//!       +-------------------- transport fault -------------------+
//! ```
//!
//! All calls block. Async callers run them inside `spawn_blocking`.

use super::command::{self, Terminator};
use super::error::ModemError;
use super::parser;
use crate::config::ModemConfig;
use crate::message::SmsMessage;
use crate::port::{PortOpener, PortSettings, SerialPortAdapter};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default time to wait for a final result code.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between reads while waiting for a reply.
pub const DEFAULT_READ_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    ConnectedUninitialized,
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::ConnectedUninitialized => write!(f, "connected (uninitialized)"),
            SessionState::Ready => write!(f, "ready"),
        }
    }
}

enum Link {
    Closed,
    Open {
        port: Box<dyn SerialPortAdapter>,
        initialized: bool,
    },
}

/// Serialized access to one modem.
pub struct ModemSession {
    port_name: String,
    settings: PortSettings,
    opener: Arc<dyn PortOpener>,
    command_timeout: Duration,
    read_poll: Duration,
    link: Link,
}

impl fmt::Debug for ModemSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModemSession")
            .field("port_name", &self.port_name)
            .field("settings", &self.settings)
            .field("command_timeout", &self.command_timeout)
            .field("state", &self.state())
            .finish()
    }
}

impl ModemSession {
    /// Create a session. Nothing is opened until the first command.
    pub fn new(
        port_name: impl Into<String>,
        settings: PortSettings,
        opener: Arc<dyn PortOpener>,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            settings,
            opener,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            read_poll: DEFAULT_READ_POLL,
            link: Link::Closed,
        }
    }

    pub fn from_config(
        port_name: impl Into<String>,
        config: &ModemConfig,
        opener: Arc<dyn PortOpener>,
    ) -> Self {
        Self::new(port_name, config.port_settings(), opener)
            .with_command_timeout(config.command_timeout())
            .with_read_poll(config.read_poll())
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_read_poll(mut self, poll: Duration) -> Self {
        self.read_poll = poll;
        self
    }

    pub fn state(&self) -> SessionState {
        match &self.link {
            Link::Closed => SessionState::Disconnected,
            Link::Open {
                initialized: false, ..
            } => SessionState::ConnectedUninitialized,
            Link::Open {
                initialized: true, ..
            } => SessionState::Ready,
        }
    }

    /// Open the port if needed and put a fresh connection into text mode.
    ///
    /// The reply to the mode command is not validated; only a transport
    /// fault makes this fail.
    pub fn ensure_ready(&mut self) -> Result<(), ModemError> {
        if let Link::Closed = self.link {
            let port = self.opener.open(&self.port_name, &self.settings)?;
            info!(
                "Opened modem port {} at {} baud",
                self.port_name, self.settings.baud_rate
            );
            self.link = Link::Open {
                port,
                initialized: false,
            };
        }

        if self.state() == SessionState::ConnectedUninitialized {
            match self.transact(command::TEXT_MODE) {
                Ok(_) => debug!("Modem on {} switched to text mode", self.port_name),
                Err(ModemError::Port(e)) => return Err(ModemError::Port(e)),
                Err(e) => debug!("Ignoring text mode reply: {}", e),
            }
            if let Link::Open { initialized, .. } = &mut self.link {
                *initialized = true;
            }
        }

        Ok(())
    }

    /// Read every unread record and delete each one from modem storage.
    ///
    /// Timeouts, error replies and unparseable records all yield an empty or
    /// shorter list. Only a transport fault is returned as an error, after
    /// the connection has been dropped.
    pub fn list_unread(&mut self) -> Result<Vec<SmsMessage>, ModemError> {
        self.ensure_ready()?;

        let reply = match self.transact(command::LIST_UNREAD) {
            Ok(reply) => reply,
            Err(ModemError::Port(e)) => return Err(ModemError::Port(e)),
            Err(e) => {
                warn!("Listing unread messages failed: {}", e);
                return Ok(Vec::new());
            }
        };

        let messages = parser::parse_list_response(&reply);
        if !messages.is_empty() {
            debug!("Modem returned {} unread message(s)", messages.len());
        }

        for message in &messages {
            self.delete(message.index);
        }

        Ok(messages)
    }

    /// Delete the record at `index`. Returns whether the modem acknowledged it.
    pub fn delete(&mut self, index: u32) -> bool {
        if let Link::Closed = self.link {
            warn!("Cannot delete record {}: modem not connected", index);
            return false;
        }

        match self.transact(&command::delete(index)) {
            Ok(_) => {
                debug!("Deleted record {}", index);
                true
            }
            Err(e) => {
                warn!("Failed to delete record {}: {}", index, e);
                false
            }
        }
    }

    /// Release the serial connection.
    pub fn close(&mut self) {
        if let Link::Open { .. } = self.link {
            info!("Closing modem port {}", self.port_name);
        }
        self.link = Link::Closed;
    }

    /// Send one command and collect the reply up to its final result code.
    fn transact(&mut self, cmd: &str) -> Result<String, ModemError> {
        let result = self.exchange(cmd);
        if let Err(ModemError::Port(e)) = &result {
            warn!(
                "Transport fault on {}, dropping connection: {}",
                self.port_name, e
            );
            self.link = Link::Closed;
        }
        result
    }

    fn exchange(&mut self, cmd: &str) -> Result<String, ModemError> {
        let timeout = self.command_timeout;
        let poll = self.read_poll;
        let port = match &mut self.link {
            Link::Open { port, .. } => port,
            Link::Closed => return Err(ModemError::NotReady),
        };

        port.clear_buffers()?;
        port.write_bytes(&command::encode(cmd))?;
        debug!("Sent {}", cmd);

        let deadline = Instant::now() + timeout;
        let mut raw = Vec::new();
        let mut chunk = [0u8; 512];

        loop {
            match port.read_bytes(&mut chunk) {
                Ok(n) if n > 0 => {
                    raw.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&raw);
                    match command::find_terminator(&text) {
                        Some(Terminator::Ok) => return Ok(text.into_owned()),
                        Some(Terminator::Error) => {
                            return Err(ModemError::ErrorReply {
                                command: cmd.to_string(),
                                reply: text.trim().to_string(),
                            })
                        }
                        None => continue,
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_idle() => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(ModemError::Timeout {
                    command: cmd.to_string(),
                    timeout,
                });
            }
            std::thread::sleep(poll);
        }
    }
}
