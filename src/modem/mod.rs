//! Cellular modem protocol.
//!
//! `session` drives the AT command conversation, `parser` turns list
//! replies into messages and `probe` finds the modem when no port is
//! configured.

pub mod command;
pub mod error;
pub mod parser;
pub mod probe;
pub mod session;

pub use error::{DiscoveryError, ModemError, ParseError};
pub use parser::{parse_list_response, ListHeader};
pub use probe::{PortProber, ProbeSequence};
pub use session::{ModemSession, SessionState};
