//! Messages flowing through the relay.
//!
//! `SmsMessage` is what the modem parser produces and only lives inside one
//! ingestion cycle. `RelayRecord` is the self-describing JSON entry that
//! crosses the relay queue; it drops the modem-local `index` and `status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage state of a record as reported by `+CMGL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Unread,
    Read,
    StoredUnsent,
    StoredSent,
    Other(String),
}

impl RecordStatus {
    /// Parse the (already unquoted) status field of a list header.
    pub fn from_field(field: &str) -> Self {
        match field.trim().to_ascii_uppercase().as_str() {
            "REC UNREAD" | "0" => Self::Unread,
            "REC READ" | "1" => Self::Read,
            "STO UNSENT" | "2" => Self::StoredUnsent,
            "STO SENT" | "3" => Self::StoredSent,
            _ => Self::Other(field.trim().to_string()),
        }
    }

    pub fn is_unread(&self) -> bool {
        matches!(self, Self::Unread)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unread => write!(f, "REC UNREAD"),
            Self::Read => write!(f, "REC READ"),
            Self::StoredUnsent => write!(f, "STO UNSENT"),
            Self::StoredSent => write!(f, "STO SENT"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// One inbound SMS record read from modem storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    /// Modem storage slot. Only valid until the record is deleted.
    pub index: u32,
    pub status: RecordStatus,
    /// Sender exactly as the modem reported it.
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    /// Body lines, each terminated by `\n`.
    pub body: String,
}

impl SmsMessage {
    /// Whether this record may leave the modem.
    pub fn is_forwardable(&self) -> bool {
        self.status.is_unread() && !self.body.is_empty()
    }

    pub fn to_record(&self) -> RelayRecord {
        RelayRecord {
            sender: self.sender.clone(),
            body: self.body.clone(),
            timestamp: self.timestamp.timestamp(),
        }
    }
}

/// Entry stored in the relay queue.
///
/// Unknown fields are ignored on decode, so entries written by older
/// producers that also carried `index` and `status` still decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRecord {
    pub sender: String,
    pub body: String,
    /// Unix seconds.
    pub timestamp: i64,
}

impl RelayRecord {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
