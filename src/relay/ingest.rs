//! Producer loop: modem to relay queue.

use super::RelayError;
use crate::config::{QueueConfig, RelayConfig};
use crate::modem::ModemSession;
use crate::queue::{encode_batch, RelayQueue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub queue_name: String,
    /// Pause after a successful poll.
    pub poll_interval: Duration,
    /// Pause after a failed poll.
    pub backoff: Duration,
}

impl IngestSettings {
    pub fn from_config(queue: &QueueConfig, relay: &RelayConfig) -> Self {
        Self {
            queue_name: queue.name.clone(),
            poll_interval: relay.poll_interval(),
            backoff: relay.ingest_backoff(),
        }
    }
}

/// Run one poll cycle and return how many messages were queued.
///
/// Nothing is sent to the queue when the modem has no unread messages.
pub async fn ingest_once(
    session: &Arc<Mutex<ModemSession>>,
    queue: &dyn RelayQueue,
    queue_name: &str,
) -> Result<usize, RelayError> {
    let session = Arc::clone(session);
    let messages = tokio::task::spawn_blocking(move || session.lock().list_unread()).await??;

    if messages.is_empty() {
        return Ok(0);
    }

    let batch = encode_batch(&messages)?;
    let len = queue.append_batch(queue_name, &batch).await?;
    debug!("Relay queue '{}' now holds {} entries", queue_name, len);

    Ok(batch.len())
}

/// Poll the modem until `cancel` fires.
///
/// Cancellation is only observed between cycles so messages already
/// deleted from the modem always reach the queue call.
pub async fn run_ingestion(
    session: Arc<Mutex<ModemSession>>,
    queue: Arc<dyn RelayQueue>,
    settings: IngestSettings,
    cancel: CancellationToken,
) {
    info!(
        "Ingestion loop started (queue '{}', poll every {:?})",
        settings.queue_name, settings.poll_interval
    );

    while !cancel.is_cancelled() {
        let pause = match ingest_once(&session, queue.as_ref(), &settings.queue_name).await {
            Ok(0) => settings.poll_interval,
            Ok(count) => {
                info!("Queued {} message(s)", count);
                settings.poll_interval
            }
            Err(e) => {
                error!("Ingestion cycle failed: {}", e);
                settings.backoff
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!("Ingestion loop stopped");
}
