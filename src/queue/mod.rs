//! Relay queue between ingestion and delivery.
//!
//! The queue is a named FIFO of opaque strings. Producers append whole
//! batches at once; consumers pop one entry at a time, blocking up to a
//! timeout. Ordering and atomicity come from the backing store.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use crate::message::SmsMessage;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode queue entry: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Durable FIFO shared by the two relay loops.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayQueue: Send + Sync {
    /// Append `items` in order as one atomic operation.
    ///
    /// Returns the queue length after the append.
    async fn append_batch(&self, queue: &str, items: &[String]) -> Result<u64, QueueError>;

    /// Remove and return the oldest entry.
    ///
    /// Waits up to `timeout` for one to appear; a zero timeout waits forever.
    async fn pop_blocking(&self, queue: &str, timeout: Duration)
        -> Result<Option<String>, QueueError>;
}

/// Serialize messages into queue entries, preserving order.
pub fn encode_batch(messages: &[SmsMessage]) -> Result<Vec<String>, QueueError> {
    messages
        .iter()
        .map(|m| m.to_record().encode().map_err(QueueError::from))
        .collect()
}
