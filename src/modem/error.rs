//! Modem protocol error types.

use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single command exchange with the modem.
#[derive(Debug, Error)]
pub enum ModemError {
    /// The session has no open connection.
    #[error("Modem connection is not open")]
    NotReady,

    /// No terminator arrived in time.
    #[error("No reply to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The modem answered with `ERROR`, `+CMS ERROR` or `+CME ERROR`.
    #[error("Modem rejected '{command}': {reply}")]
    ErrorReply { command: String, reply: String },

    /// Serial transport failure. The connection is dropped when this occurs.
    #[error("Serial transport failure: {0}")]
    Port(#[from] PortError),
}

/// A list header or timestamp the parser could not understand.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Header has {found} fields, at least {expected} required: {line}")]
    TooFewFields {
        found: usize,
        expected: usize,
        line: String,
    },

    #[error("Invalid record index '{0}'")]
    InvalidIndex(String),

    #[error("Not a list header: {0}")]
    NotAHeader(String),

    #[error("Invalid timestamp '{date} {time}'")]
    InvalidTimestamp { date: String, time: String },
}

/// Modem discovery failed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No modem answered the liveness probe ({tried} port(s) tried)")]
    NoModemFound { tried: usize },

    #[error("Could not enumerate serial ports: {0}")]
    Enumeration(#[from] PortError),
}
