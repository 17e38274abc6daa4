//! MQTT transport for the publisher.
//!
//! `MqttBus` sends through a `rumqttc::AsyncClient`. The matching event loop
//! is driven by `ConnectionKernel`, which performs the initial handshake and
//! then keeps reconnecting at a fixed interval until cancelled, reporting
//! every transition on a watch channel.

use super::state::ConnectionState;
use super::{BusClient, PublishError};
use crate::config::BusConfig;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 64;

/// How long shutdown waits for DISCONNECT to reach the wire.
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Build client options from configuration.
pub fn mqtt_options(config: &BusConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.effective_client_id(), &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options
}

/// Publishing half of an MQTT connection.
pub struct MqttBus {
    client: AsyncClient,
    qos: QoS,
}

impl MqttBus {
    pub fn new(client: AsyncClient, qos: QoS) -> Self {
        Self { client, qos }
    }
}

#[async_trait]
impl BusClient for MqttBus {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(PublishError::from)
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        self.client.disconnect().await.map_err(PublishError::from)
    }
}

/// Drives the MQTT event loop and owns the connection state.
pub struct ConnectionKernel {
    event_loop: EventLoop,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_interval: Duration,
    cancel: CancellationToken,
    attempt: u32,
}

impl ConnectionKernel {
    pub fn new(
        event_loop: EventLoop,
        reconnect_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            event_loop,
            state_tx,
            reconnect_interval,
            cancel,
            attempt: 0,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
        if changed {
            info!("Bus connection state changed to: {}", state);
        }
    }

    /// Poll until the broker accepts the connection.
    ///
    /// Any error or an elapsed `timeout` is returned; nothing is retried.
    pub async fn establish(&mut self, timeout: Duration) -> Result<(), PublishError> {
        let handshake = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(PublishError::Connect(format!("{:?}", ack.code)))
                        };
                    }
                    Ok(event) => trace!("Handshake event: {:?}", event),
                    Err(e) => return Err(PublishError::Connect(e.to_string())),
                }
            }
        };

        match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(())) => {
                info!("Connected to message bus");
                self.update_state(ConnectionState::Connected);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PublishError::ConnectTimeout(timeout)),
        }
    }

    /// Keep the connection alive until cancelled.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                event = self.event_loop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        self.attempt += 1;
                        warn!(
                            "Bus connection error, retrying in {:?}: {}",
                            self.reconnect_interval, e
                        );
                        self.update_state(ConnectionState::Reconnecting {
                            attempt: self.attempt,
                        });

                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.reconnect_interval) => {}
                        }
                    }
                },
            }
        }

        self.flush_disconnect().await;
        self.update_state(ConnectionState::Closed);
        info!("Bus connection supervisor stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    if self.attempt > 0 {
                        info!("Reconnected to message bus after {} attempt(s)", self.attempt);
                    }
                    self.attempt = 0;
                    self.update_state(ConnectionState::Connected);
                } else {
                    warn!("Broker refused connection: {:?}", ack.code);
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                debug!("Broker acknowledged packet {}", ack.pkid);
            }
            Event::Incoming(packet) => trace!("Incoming packet: {:?}", packet),
            Event::Outgoing(outgoing) => trace!("Outgoing packet: {:?}", outgoing),
        }
    }

    /// Give a queued DISCONNECT a moment to reach the broker.
    async fn flush_disconnect(&mut self) {
        if !self.state_tx.borrow().is_connected() {
            return;
        }

        let flush = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH, flush).await.is_err() {
            debug!("No DISCONNECT flushed before shutdown");
        }
    }
}

/// Connect to the broker, failing if the first handshake does not succeed.
///
/// On success the kernel is running on its own task.
pub async fn connect(
    config: &BusConfig,
    cancel: CancellationToken,
) -> Result<
    (
        MqttBus,
        watch::Receiver<ConnectionState>,
        tokio::task::JoinHandle<()>,
    ),
    PublishError,
> {
    let (client, event_loop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
    info!("Connecting to MQTT broker at {}:{}", config.host, config.port);

    let mut kernel = ConnectionKernel::new(event_loop, config.reconnect_interval(), cancel);
    kernel.establish(config.connect_timeout()).await?;

    let state_rx = kernel.subscribe_state();
    let handle = tokio::spawn(kernel.run());

    Ok((MqttBus::new(client, qos_from_level(config.qos)), state_rx, handle))
}
