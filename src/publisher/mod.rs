//! Message bus publisher.
//!
//! A `Publisher` turns relay records into bus messages. The transport sits
//! behind `BusClient`; connection upkeep happens in a background supervisor
//! that reports through a `ConnectionState` watch channel. `publish` waits
//! on that channel while the bus is down.

pub mod mqtt;
pub mod routing;
pub mod state;

pub use routing::{normalize_sender, routing_key};
pub use state::ConnectionState;

use crate::config::BusConfig;
use crate::message::RelayRecord;
use crate::relay::{DeliveryOutcome, DeliverySink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to connect to message bus: {0}")]
    Connect(String),

    #[error("No CONNACK from message bus within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Message bus not connected: {0}")]
    NotConnected(String),

    #[error("Publisher is closed")]
    Closed,

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Failed to encode payload: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Sending half of a bus connection.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    async fn disconnect(&self) -> Result<(), PublishError>;
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Publisher {
    client: Arc<dyn BusClient>,
    state: watch::Receiver<ConnectionState>,
    namespace: String,
    publish_wait: Option<Duration>,
    closed: AtomicBool,
    supervisor: Mutex<Option<Supervisor>>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("namespace", &self.namespace)
            .field("state", &*self.state.borrow())
            .field("publish_wait", &self.publish_wait)
            .finish()
    }
}

impl Publisher {
    /// Connect to the MQTT broker in `config`.
    ///
    /// A failed or timed out first handshake is returned as an error. After
    /// that, reconnects are handled in the background until `close`.
    pub async fn connect(config: &BusConfig) -> Result<Self, PublishError> {
        let cancel = CancellationToken::new();
        let (bus, state, handle) = mqtt::connect(config, cancel.clone()).await?;

        let publisher = Self::from_parts(
            Arc::new(bus),
            state,
            config.namespace.clone(),
            config.publish_wait(),
        );
        *publisher.supervisor.lock() = Some(Supervisor { cancel, handle });
        Ok(publisher)
    }

    /// Assemble a publisher over any transport. Connection upkeep is up to
    /// whoever owns the sending side of `state`.
    pub fn from_parts(
        client: Arc<dyn BusClient>,
        state: watch::Receiver<ConnectionState>,
        namespace: impl Into<String>,
        publish_wait: Option<Duration>,
    ) -> Self {
        Self {
            client,
            state,
            namespace: namespace.into(),
            publish_wait,
            closed: AtomicBool::new(false),
            supervisor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    async fn wait_connected(&self) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        let mut state = self.state.clone();
        let ready = async move {
            state
                .wait_for(|s| s.is_connected() || s.is_closed())
                .await
                .map(|s| s.is_connected())
                .unwrap_or(false)
        };

        let connected = match self.publish_wait {
            None => ready.await,
            Some(limit) => tokio::time::timeout(limit, ready).await.map_err(|_| {
                PublishError::NotConnected(format!("still {} after {:?}", self.state(), limit))
            })?,
        };

        if connected {
            Ok(())
        } else {
            Err(PublishError::Closed)
        }
    }

    /// Publish one record.
    ///
    /// Blocks while the bus is down (bounded by `publish_wait` when set).
    /// Failing to get a connection is an error; a failed send once connected
    /// is reported as `NotDelivered`.
    pub async fn publish(&self, record: &RelayRecord) -> Result<DeliveryOutcome, PublishError> {
        if !self.state.borrow().is_connected() {
            debug!("Bus is {}, waiting before publish", self.state());
        }
        self.wait_connected().await?;

        let topic = routing_key(&self.namespace, &record.sender, record.timestamp);
        let payload = serde_json::to_vec(&record.body)?;

        match self.client.send(&topic, payload).await {
            Ok(()) => {
                debug!("Published to {}", topic);
                Ok(DeliveryOutcome::Delivered { topic })
            }
            Err(e) => {
                warn!("Publish to {} failed: {}", topic, e);
                Ok(DeliveryOutcome::NotDelivered {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Send DISCONNECT and stop the supervisor. Later publishes fail.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request failed: {}", e);
        }

        let supervisor = self.supervisor.lock().take();
        if let Some(Supervisor { cancel, handle }) = supervisor {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Bus supervisor task failed: {}", e);
            }
        }
        info!("Publisher closed");
    }
}

#[async_trait]
impl DeliverySink for Publisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn deliver(&self, record: &RelayRecord) -> DeliveryOutcome {
        match self.publish(record).await {
            Ok(outcome) => outcome,
            Err(e) => DeliveryOutcome::NotDelivered {
                reason: e.to_string(),
            },
        }
    }

    async fn shutdown(&self) {
        self.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingBus {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl BusClient for RecordingBus {
        async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PublishError::NotConnected("broker hung up".into()));
            }
            self.sent.lock().push((topic.to_string(), payload));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), PublishError> {
            Ok(())
        }
    }

    fn record() -> RelayRecord {
        RelayRecord {
            sender: "+15550001234".into(),
            body: "Hello\n".into(),
            timestamp: 1_705_314_600,
        }
    }

    #[tokio::test]
    async fn test_publish_topic_and_payload() {
        let bus = Arc::new(RecordingBus::default());
        let (_tx, rx) = watch::channel(ConnectionState::Connected);
        let publisher = Publisher::from_parts(bus.clone(), rx, "modem", None);

        let outcome = publisher.publish(&record()).await.unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Delivered {
                topic: "modem/15550001234/1705314600".into()
            }
        );

        let sent = bus.sent.lock();
        assert_eq!(sent[0].1, br#""Hello\n""#.to_vec());
    }

    #[tokio::test]
    async fn test_send_failure_is_not_delivered() {
        let bus = Arc::new(RecordingBus::default());
        bus.fail.store(true, Ordering::SeqCst);
        let (_tx, rx) = watch::channel(ConnectionState::Connected);
        let publisher = Publisher::from_parts(bus, rx, "modem", None);

        let outcome = publisher.publish(&record()).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::NotDelivered { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_fails_explicitly() {
        let bus = Arc::new(RecordingBus::default());
        let (_tx, rx) = watch::channel(ConnectionState::Reconnecting { attempt: 1 });
        let publisher =
            Publisher::from_parts(bus.clone(), rx, "modem", Some(Duration::from_secs(2)));

        let err = publisher.publish(&record()).await.unwrap_err();
        assert!(matches!(err, PublishError::NotConnected(_)));
        assert!(bus.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let bus = Arc::new(RecordingBus::default());
        let (_tx, rx) = watch::channel(ConnectionState::Connected);
        let publisher = Publisher::from_parts(bus, rx, "modem", None);

        publisher.close().await;
        assert!(matches!(
            publisher.publish(&record()).await,
            Err(PublishError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_closed_state_wakes_waiting_publish() {
        let bus = Arc::new(RecordingBus::default());
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let publisher = Arc::new(Publisher::from_parts(bus, rx, "modem", None));

        let waiting = {
            let publisher = publisher.clone();
            tokio::spawn(async move { publisher.publish(&record()).await })
        };
        tokio::task::yield_now().await;
        tx.send(ConnectionState::Closed).unwrap();

        assert!(matches!(waiting.await.unwrap(), Err(PublishError::Closed)));
    }
}
