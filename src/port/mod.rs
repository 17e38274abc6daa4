//! Port abstraction layer for serial communication.
//!
//! Provides the adapter trait, the `serialport`-backed implementation and a
//! scriptable mock, enabling the modem session to be tested without hardware.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::{available_port_names, SyncSerialPort, SystemPortOpener};
pub use traits::{PortOpener, PortSettings, SerialPortAdapter, DEFAULT_BAUD_RATE};
