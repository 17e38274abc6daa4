//! Process wiring: one modem session, two relay loops, one delivery sink.

use crate::config::{Config, ConfigError, SinkKind};
use crate::error::GatewayResult;
use crate::modem::ModemSession;
use crate::port::SystemPortOpener;
use crate::publisher::Publisher;
use crate::queue::{RedisQueue, RelayQueue};
use crate::relay::{run_delivery, run_ingestion, DeliverySettings, DeliverySink, IngestSettings};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long shutdown waits for each loop before aborting it.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running relay.
pub struct Gateway {
    cancel: CancellationToken,
    session: Arc<Mutex<ModemSession>>,
    sink: Arc<dyn DeliverySink>,
    ingestion: JoinHandle<()>,
    delivery: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl Gateway {
    /// Connect everything described by `config` and start relaying from
    /// the modem on `port_name`.
    ///
    /// Fails if the delivery sink cannot be reached. A modem that does not
    /// open yet is only logged; ingestion keeps retrying.
    pub async fn start(config: &Config, port_name: &str) -> GatewayResult<Self> {
        let sink = connect_sink(config).await?;

        // BLPOP blocks its connection, so each loop gets its own.
        let ingest_queue = Arc::new(RedisQueue::from_config(&config.queue)?);
        let delivery_queue = Arc::new(RedisQueue::from_config(&config.queue)?);

        let session =
            ModemSession::from_config(port_name, &config.modem, Arc::new(SystemPortOpener));
        let session = Arc::new(Mutex::new(session));
        {
            let session = Arc::clone(&session);
            let opened = tokio::task::spawn_blocking(move || session.lock().ensure_ready()).await?;
            if let Err(e) = opened {
                warn!("Modem on {} not ready yet: {}", port_name, e);
            }
        }

        Ok(Self::spawn(
            session,
            ingest_queue,
            delivery_queue,
            sink,
            IngestSettings::from_config(&config.queue, &config.relay),
            DeliverySettings::from_config(&config.queue, &config.relay),
        ))
    }

    /// Start both loops over already built parts.
    pub fn spawn(
        session: Arc<Mutex<ModemSession>>,
        ingest_queue: Arc<dyn RelayQueue>,
        delivery_queue: Arc<dyn RelayQueue>,
        sink: Arc<dyn DeliverySink>,
        ingest: IngestSettings,
        delivery: DeliverySettings,
    ) -> Self {
        let cancel = CancellationToken::new();

        let ingestion = tokio::spawn(run_ingestion(
            Arc::clone(&session),
            ingest_queue,
            ingest,
            cancel.child_token(),
        ));
        let delivery = tokio::spawn(run_delivery(
            delivery_queue,
            Arc::clone(&sink),
            delivery,
            cancel.child_token(),
        ));

        Self {
            cancel,
            session,
            sink,
            ingestion,
            delivery,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Whether either loop has exited.
    pub fn is_finished(&self) -> bool {
        self.ingestion.is_finished() || self.delivery.is_finished()
    }

    /// Stop both loops, then close the modem port and the sink.
    pub async fn shutdown(self) -> GatewayResult<()> {
        info!("Stopping relay loops");
        self.cancel.cancel();

        join_or_abort("ingestion", self.ingestion, self.shutdown_timeout).await;
        join_or_abort("delivery", self.delivery, self.shutdown_timeout).await;

        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || session.lock().close()).await?;
        self.sink.shutdown().await;

        info!("Gateway stopped");
        Ok(())
    }
}

async fn join_or_abort(name: &str, mut handle: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{} loop failed: {}", name, e),
        Err(_) => {
            warn!("{} loop did not stop within {:?}, aborting", name, timeout);
            handle.abort();
        }
    }
}

async fn connect_sink(config: &Config) -> GatewayResult<Arc<dyn DeliverySink>> {
    match config.relay.sink {
        SinkKind::Mqtt => {
            let publisher = Publisher::connect(&config.bus).await?;
            Ok(Arc::new(publisher))
        }
        SinkKind::Http => http_sink(config),
    }
}

#[cfg(feature = "http-sender")]
fn http_sink(config: &Config) -> GatewayResult<Arc<dyn DeliverySink>> {
    let sender = crate::http::HttpSender::from_config(&config.http)
        .ok_or_else(|| ConfigError::validation("http.url", "required when relay.sink = \"http\""))?;
    info!("Delivering by HTTP POST to {}", sender.url());
    Ok(Arc::new(sender))
}

#[cfg(not(feature = "http-sender"))]
fn http_sink(_config: &Config) -> GatewayResult<Arc<dyn DeliverySink>> {
    Err(ConfigError::validation("relay.sink", "built without the http-sender feature").into())
}
