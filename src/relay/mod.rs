//! Store-and-forward relay.
//!
//! Two independent loops share nothing but the relay queue:
//!
//! - ingestion drains unread messages from the modem into the queue
//! - delivery pops queue entries and hands them to a `DeliverySink`
//!
//! Either side can stall or fail without holding up the other.

pub mod deliver;
pub mod ingest;

pub use deliver::{deliver_once, run_delivery, DeliverySettings, DeliveryStep};
pub use ingest::{ingest_once, run_ingestion, IngestSettings};

use crate::message::RelayRecord;
use crate::modem::ModemError;
use crate::queue::QueueError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Modem error: {0}")]
    Modem(#[from] ModemError),

    #[error("Relay queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Undecodable queue entry: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result of handing one record to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { topic: String },
    NotDelivered { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Destination of the delivery loop.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn deliver(&self, record: &RelayRecord) -> DeliveryOutcome;

    /// Release the sink's connection.
    async fn shutdown(&self);
}

/// What the delivery loop does with a record the sink did not take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryFailurePolicy {
    /// Log and discard.
    #[default]
    Drop,
    /// Append the entry back to the tail of the queue.
    Requeue,
}

impl fmt::Display for DeliveryFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryFailurePolicy::Drop => write!(f, "drop"),
            DeliveryFailurePolicy::Requeue => write!(f, "requeue"),
        }
    }
}
