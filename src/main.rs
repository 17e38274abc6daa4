use clap::Parser;
use sms_relay::config::{Config, ConfigLoader};
use sms_relay::modem::PortProber;
use sms_relay::port::SystemPortOpener;
use sms_relay::{logging, Gateway};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

// Command-line arguments. Anything given here wins over file and environment.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Relays SMS received by a cellular modem to an MQTT bus through a Redis queue.",
    long_about = "Polls a cellular modem for unread SMS, deletes them from the modem once read, parks them in a Redis list and republishes each one on MQTT as <namespace>/<sender digits>/<unix time>. Either side may go down without the other losing messages."
)]
struct Args {
    /// Serial port of the modem. Probed for when not set.
    #[arg(short = 'p', long)]
    serial_port: Option<String>,

    /// Baud rate for the serial port.
    #[arg(short = 'b', long)]
    baudrate: Option<u32>,

    /// Redis server host.
    #[arg(short = 'r', long)]
    redis_host: Option<String>,

    /// Redis server port.
    #[arg(long)]
    redis_port: Option<u16>,

    /// Redis list used as the relay queue.
    #[arg(short = 'q', long)]
    redis_queue: Option<String>,

    /// MQTT broker address.
    #[arg(short = 'm', long)]
    mqtt_broker: Option<String>,

    /// MQTT broker port.
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// First topic level for published messages.
    #[arg(short = 't', long)]
    mqtt_topic: Option<String>,

    /// Logging level (DEBUG, INFO, WARNING, ERROR, CRITICAL).
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Configuration file. Overrides the default search path.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Find the modem, print its port and exit.
    #[arg(long)]
    probe_only: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.serial_port {
            config.modem.port = Some(port.clone()).filter(|p| !p.is_empty());
        }
        if let Some(baud) = self.baudrate {
            config.modem.baud_rate = baud;
        }
        if let Some(host) = &self.redis_host {
            config.queue.host = host.clone();
        }
        if let Some(port) = self.redis_port {
            config.queue.port = port;
        }
        if let Some(name) = &self.redis_queue {
            config.queue.name = name.clone();
        }
        if let Some(host) = &self.mqtt_broker {
            config.bus.host = host.clone();
        }
        if let Some(port) = self.mqtt_port {
            config.bus.port = port;
        }
        if let Some(namespace) = &self.mqtt_topic {
            config.bus.namespace = namespace.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let config_path = loader.config_path.clone();
    let mut config = loader.into_config();
    args.apply(&mut config);
    config.validate()?;

    logging::init(&config.logging)?;
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let port_name = match config.modem.port.clone() {
        Some(port) => port,
        None => {
            let prober = PortProber::from_config(&config.modem, Arc::new(SystemPortOpener));
            let found = tokio::task::spawn_blocking(move || prober.find_modem(None)).await?;
            match found {
                Ok(port) => port,
                Err(e) => {
                    error!("Failed to find modem port: {}", e);
                    return Err(e.into());
                }
            }
        }
    };

    if args.probe_only {
        println!("{}", port_name);
        return Ok(());
    }
    info!("Using serial port: {}", port_name);

    let gateway = Gateway::start(&config, &port_name).await?;
    info!("SMS relay started");

    shutdown_signal().await;

    gateway.shutdown().await?;
    Ok(())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, starting graceful shutdown...");
}
