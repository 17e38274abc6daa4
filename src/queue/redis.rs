//! Redis-backed relay queue.

use super::{QueueError, RelayQueue};
use crate::config::QueueConfig;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Relay queue stored in a Redis list (`RPUSH` / `BLPOP`).
///
/// `BLPOP` holds its connection for as long as it waits, so each relay loop
/// gets its own `RedisQueue`. The connection is opened on first use and
/// reopened after any error.
pub struct RedisQueue {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue")
            .field("server", &self.client.get_connection_info().addr)
            .finish()
    }
}

impl RedisQueue {
    pub fn open(host: &str, port: u16) -> Result<Self, QueueError> {
        let client = redis::Client::open(format!("redis://{host}:{port}/"))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        Self::open(&config.host, config.port)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        info!(
            "Connected to relay queue at {}",
            self.client.get_connection_info().addr
        );
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn invalidate(&self, error: &redis::RedisError) {
        warn!("Relay queue connection dropped: {}", error);
        *self.connection.lock().await = None;
    }
}

#[async_trait]
impl RelayQueue for RedisQueue {
    async fn append_batch(&self, queue: &str, items: &[String]) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;

        let result = if items.is_empty() {
            conn.llen::<_, u64>(queue).await
        } else {
            conn.rpush::<_, _, u64>(queue, items).await
        };

        match result {
            Ok(len) => {
                debug!("Appended {} entries to '{}' (len {})", items.len(), queue, len);
                Ok(len)
            }
            Err(e) => {
                self.invalidate(&e).await;
                Err(e.into())
            }
        }
    }

    async fn pop_blocking(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        let mut conn = self.connection().await?;

        match conn
            .blpop::<_, Option<(String, String)>>(queue, timeout.as_secs_f64())
            .await
        {
            Ok(entry) => Ok(entry.map(|(_, value)| value)),
            Err(e) => {
                self.invalidate(&e).await;
                Err(e.into())
            }
        }
    }
}
