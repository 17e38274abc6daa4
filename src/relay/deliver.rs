//! Consumer loop: relay queue to delivery sink.

use super::{DeliveryFailurePolicy, DeliveryOutcome, DeliverySink, RelayError};
use crate::config::{QueueConfig, RelayConfig};
use crate::message::RelayRecord;
use crate::queue::RelayQueue;
use std::slice;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    pub queue_name: String,
    /// How long one pop waits for an entry. Zero waits forever.
    pub pop_timeout: Duration,
    /// Pause after a failed or requeued delivery.
    pub backoff: Duration,
    pub policy: DeliveryFailurePolicy,
}

impl DeliverySettings {
    pub fn from_config(queue: &QueueConfig, relay: &RelayConfig) -> Self {
        Self {
            queue_name: queue.name.clone(),
            pop_timeout: queue.pop_timeout(),
            backoff: relay.delivery_backoff(),
            policy: relay.on_delivery_failure,
        }
    }
}

/// What one delivery step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStep {
    /// Pop timed out with the queue empty.
    Idle,
    Delivered { topic: String },
    /// Sink refused the record; it was discarded.
    Dropped,
    /// Sink refused the record; it went back into the queue.
    Requeued,
    /// Shutdown arrived mid-delivery; the entry was put back.
    Stopped,
}

/// Pop one entry and deliver it.
///
/// The pop itself is never interrupted, so an entry is never removed from
/// the queue without being handled. Cancellation during delivery puts the
/// entry back.
pub async fn deliver_once(
    queue: &dyn RelayQueue,
    sink: &dyn DeliverySink,
    settings: &DeliverySettings,
    cancel: &CancellationToken,
) -> Result<DeliveryStep, RelayError> {
    let raw = match queue
        .pop_blocking(&settings.queue_name, settings.pop_timeout)
        .await?
    {
        Some(raw) => raw,
        None => return Ok(DeliveryStep::Idle),
    };

    let record = RelayRecord::decode(&raw).map_err(RelayError::Decode)?;

    let outcome = tokio::select! {
        outcome = sink.deliver(&record) => outcome,
        _ = cancel.cancelled() => {
            queue.append_batch(&settings.queue_name, slice::from_ref(&raw)).await?;
            debug!("Returned in-flight entry to '{}'", settings.queue_name);
            return Ok(DeliveryStep::Stopped);
        }
    };

    match outcome {
        DeliveryOutcome::Delivered { topic } => Ok(DeliveryStep::Delivered { topic }),
        DeliveryOutcome::NotDelivered { reason } => match settings.policy {
            DeliveryFailurePolicy::Drop => {
                warn!(
                    "Dropping message from {} at {}: {}",
                    record.sender, record.timestamp, reason
                );
                Ok(DeliveryStep::Dropped)
            }
            DeliveryFailurePolicy::Requeue => {
                queue
                    .append_batch(&settings.queue_name, slice::from_ref(&raw))
                    .await?;
                warn!(
                    "Requeued message from {} at {}: {}",
                    record.sender, record.timestamp, reason
                );
                Ok(DeliveryStep::Requeued)
            }
        },
    }
}

/// Deliver queued entries until `cancel` fires.
pub async fn run_delivery(
    queue: Arc<dyn RelayQueue>,
    sink: Arc<dyn DeliverySink>,
    settings: DeliverySettings,
    cancel: CancellationToken,
) {
    info!(
        "Delivery loop started (queue '{}' -> {}, on failure: {})",
        settings.queue_name,
        sink.name(),
        settings.policy
    );

    while !cancel.is_cancelled() {
        let backoff = match deliver_once(queue.as_ref(), sink.as_ref(), &settings, &cancel).await {
            Ok(DeliveryStep::Delivered { topic }) => {
                debug!("Delivered to {}", topic);
                false
            }
            Ok(DeliveryStep::Idle) | Ok(DeliveryStep::Dropped) => false,
            Ok(DeliveryStep::Requeued) => true,
            Ok(DeliveryStep::Stopped) => break,
            Err(e) => {
                error!("Delivery cycle failed: {}", e);
                true
            }
        };

        if backoff {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(settings.backoff) => {}
            }
        }
    }

    info!("Delivery loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, MockRelayQueue};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct ScriptedSink {
        accept: bool,
        seen: Mutex<Vec<RelayRecord>>,
    }

    impl ScriptedSink {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DeliverySink for ScriptedSink {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn deliver(&self, record: &RelayRecord) -> DeliveryOutcome {
            self.seen.lock().push(record.clone());
            if self.accept {
                DeliveryOutcome::Delivered {
                    topic: format!("t/{}", record.timestamp),
                }
            } else {
                DeliveryOutcome::NotDelivered {
                    reason: "refused".into(),
                }
            }
        }

        async fn shutdown(&self) {}
    }

    fn settings(policy: DeliveryFailurePolicy) -> DeliverySettings {
        DeliverySettings {
            queue_name: "q".into(),
            pop_timeout: Duration::from_millis(10),
            backoff: Duration::from_millis(10),
            policy,
        }
    }

    fn entry(ts: i64) -> String {
        RelayRecord {
            sender: "+1555".into(),
            body: "hi\n".into(),
            timestamp: ts,
        }
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let queue = MemoryQueue::new();
        let sink = ScriptedSink::new(true);
        let step = deliver_once(
            &queue,
            &sink,
            &settings(DeliveryFailurePolicy::Drop),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(step, DeliveryStep::Idle);
    }

    #[tokio::test]
    async fn test_drop_policy_discards() {
        let queue = MemoryQueue::new();
        queue.append_batch("q", &[entry(1)]).await.unwrap();
        let sink = ScriptedSink::new(false);

        let step = deliver_once(
            &queue,
            &sink,
            &settings(DeliveryFailurePolicy::Drop),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(step, DeliveryStep::Dropped);
        assert!(queue.is_empty("q"));
    }

    #[tokio::test]
    async fn test_requeue_policy_appends_back() {
        let queue = MemoryQueue::new();
        queue.append_batch("q", &[entry(1), entry(2)]).await.unwrap();
        let sink = ScriptedSink::new(false);

        let step = deliver_once(
            &queue,
            &sink,
            &settings(DeliveryFailurePolicy::Requeue),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(step, DeliveryStep::Requeued);
        assert_eq!(queue.snapshot("q"), vec![entry(2), entry(1)]);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_an_error() {
        let queue = MemoryQueue::new();
        queue
            .append_batch("q", &["not json".to_string()])
            .await
            .unwrap();
        let sink = ScriptedSink::new(true);

        let result = deliver_once(
            &queue,
            &sink,
            &settings(DeliveryFailurePolicy::Requeue),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(RelayError::Decode(_))));
        assert!(sink.seen.lock().is_empty());
        assert!(queue.is_empty("q"));
    }

    #[tokio::test]
    async fn test_pop_failure_propagates() {
        let mut queue = MockRelayQueue::new();
        queue
            .expect_pop_blocking()
            .returning(|_, _| Err(crate::queue::QueueError::Unavailable("gone".into())));
        let sink = ScriptedSink::new(true);

        let result = deliver_once(
            &queue,
            &sink,
            &settings(DeliveryFailurePolicy::Drop),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(RelayError::Queue(_))));
    }

    #[tokio::test]
    async fn test_run_delivery_drains_in_order_then_stops() {
        let queue = MemoryQueue::new();
        queue
            .append_batch("q", &[entry(1), entry(2), entry(3)])
            .await
            .unwrap();
        let sink = Arc::new(ScriptedSink::new(true));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_delivery(
            Arc::new(queue.clone()),
            sink.clone(),
            settings(DeliveryFailurePolicy::Drop),
            cancel.clone(),
        ));

        for _ in 0..100 {
            if sink.seen.lock().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        let stamps: Vec<i64> = sink.seen.lock().iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
    }
}
