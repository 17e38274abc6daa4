//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` lets the modem session and the prober run against
//! real hardware or `MockSerialPort` interchangeably. `PortOpener` goes one
//! step further and lets the session reopen a port after a fault without
//! knowing where ports come from.

use super::error::PortError;
use std::time::Duration;

/// Default baud rate for cellular modems.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Settings used when opening a modem port.
///
/// Modems talk 8N1 without flow control, so only the line speed and the
/// per-read timeout are configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// How long a single read may block before reporting "no data".
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl PortSettings {
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            baud_rate,
            read_timeout,
        }
    }
}

/// Trait for serial port I/O operations.
///
/// Dropping an adapter closes the underlying port.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Discard any unread input and unsent output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;
}

/// Opens serial ports by name.
///
/// The modem session owns one opener and calls it every time it needs a
/// fresh connection.
pub trait PortOpener: Send + Sync {
    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

impl<F> PortOpener for F
where
    F: Fn(&str, &PortSettings) -> Result<Box<dyn SerialPortAdapter>, PortError> + Send + Sync,
{
    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        self(port_name, settings)
    }
}
