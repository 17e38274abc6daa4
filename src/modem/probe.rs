//! Modem discovery.
//!
//! Each candidate port is opened, sent a liveness probe and given a short
//! moment to answer. The first port whose reply contains the expected token
//! wins. Every candidate is closed again before the next one is tried.

use super::command;
use super::error::DiscoveryError;
use crate::config::ModemConfig;
use crate::port::{available_port_names, PortOpener, PortSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default time a candidate gets to answer the probe.
pub const DEFAULT_PROBE_WAIT: Duration = Duration::from_millis(500);

/// Probe bytes and the replies that count as a match.
#[derive(Debug, Clone)]
pub struct ProbeSequence {
    /// The command to send.
    pub command: Vec<u8>,

    /// Expected response patterns (any match is success).
    pub expected_responses: Vec<Vec<u8>>,
}

impl ProbeSequence {
    pub fn new(command: impl Into<Vec<u8>>, expected_responses: Vec<Vec<u8>>) -> Self {
        Self {
            command: command.into(),
            expected_responses,
        }
    }

    /// `AT` answered by `OK`.
    pub fn liveness() -> Self {
        Self::new(
            command::encode(command::PROBE),
            vec![command::PROBE_REPLY.as_bytes().to_vec()],
        )
    }

    /// Check if response contains any expected pattern.
    pub fn matches(&self, response: &[u8]) -> bool {
        self.expected_responses.iter().any(|expected| {
            if response.len() < expected.len() {
                return false;
            }
            response
                .windows(expected.len())
                .any(|window| window == expected.as_slice())
        })
    }
}

/// Scans serial ports for a responsive modem.
pub struct PortProber {
    opener: Arc<dyn PortOpener>,
    settings: PortSettings,
    wait: Duration,
    probe: ProbeSequence,
    exclude: Vec<String>,
}

impl PortProber {
    pub fn new(opener: Arc<dyn PortOpener>, settings: PortSettings) -> Self {
        Self {
            opener,
            settings,
            wait: DEFAULT_PROBE_WAIT,
            probe: ProbeSequence::liveness(),
            exclude: Vec::new(),
        }
    }

    pub fn from_config(config: &ModemConfig, opener: Arc<dyn PortOpener>) -> Self {
        Self::new(opener, config.port_settings())
            .with_wait(config.probe_wait())
            .with_exclusions(config.exclude_ports.clone())
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Ports never probed during discovery.
    pub fn with_exclusions(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_probe(mut self, probe: ProbeSequence) -> Self {
        self.probe = probe;
        self
    }

    /// Whether a modem answers on `port_name`. The port is closed on return.
    pub fn probe_port(&self, port_name: &str) -> bool {
        let mut port = match self.opener.open(port_name, &self.settings) {
            Ok(port) => port,
            Err(e) => {
                warn!("Skipping {}: {}", port_name, e);
                return false;
            }
        };

        if let Err(e) = port.write_bytes(&self.probe.command) {
            debug!("Probe write to {} failed: {}", port_name, e);
            return false;
        }

        std::thread::sleep(self.wait);

        let mut response = Vec::new();
        let mut buffer = [0u8; 256];
        loop {
            match port.read_bytes(&mut buffer) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(e) if e.is_idle() => break,
                Err(e) => {
                    debug!("Probe read from {} failed: {}", port_name, e);
                    break;
                }
            }
        }

        let matched = self.probe.matches(&response);
        debug!(
            "Probe on {}: {} byte(s) back, match={}",
            port_name,
            response.len(),
            matched
        );
        matched
    }

    /// Return the first candidate that answers the probe.
    ///
    /// With no candidates every port present on the system is tried.
    pub fn find_modem(&self, candidates: Option<&[String]>) -> Result<String, DiscoveryError> {
        let ports = match candidates {
            Some(list) => list.to_vec(),
            None => available_port_names()?,
        };

        let mut tried = 0;
        for name in ports.iter().filter(|p| !self.exclude.contains(p)) {
            tried += 1;
            if self.probe_port(name) {
                info!("Modem found on {}", name);
                return Ok(name.clone());
            }
        }

        Err(DiscoveryError::NoModemFound { tried })
    }
}
