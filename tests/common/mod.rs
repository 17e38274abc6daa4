//! Shared test utilities for the SMS relay tests.
//!
//! This module provides common test infrastructure including:
//! - Mock modems with scripted AT replies
//! - Sessions and openers wired to those mocks
//! - A recording bus transport for publisher tests
//! - Polling helpers for asynchronous assertions

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sms_relay::modem::ModemSession;
use sms_relay::port::{MockSerialPort, PortError, PortOpener, PortSettings, SerialPortAdapter};
use sms_relay::publisher::{BusClient, PublishError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEXT_MODE: &[u8] = b"AT+CMGF=1\r";
pub const LIST_UNREAD: &[u8] = b"AT+CMGL=\"REC UNREAD\"\r";

/// `+CMGL:` header line with separate date and time fields.
pub fn header(index: u32, status: &str, sender: &str, date: &str, time: &str) -> String {
    format!("+CMGL: {index},\"{status}\",\"{sender}\",,\"{date}\",\"{time}\"\r\n")
}

/// Full list reply: echo, records, final `OK`.
pub fn listing(records: &[(String, &str)]) -> Vec<u8> {
    let mut reply = String::from("AT+CMGL=\"REC UNREAD\"\r\r\n");
    for (head, body) in records {
        reply.push_str(head);
        if !body.is_empty() {
            reply.push_str(body);
            reply.push_str("\r\n");
        }
    }
    reply.push_str("\r\nOK\r\n");
    reply.into_bytes()
}

/// Mock modem that accepts text mode.
pub fn mock_modem(name: &str) -> MockSerialPort {
    let mut mock = MockSerialPort::new(name);
    mock.script_reply(TEXT_MODE, b"AT+CMGF=1\r\r\nOK\r\n");
    mock
}

/// Script one listing followed by an acknowledged delete per index.
pub fn script_cycle(mock: &mut MockSerialPort, reply: &[u8], deleted: &[u32]) {
    mock.script_reply(LIST_UNREAD, reply);
    for index in deleted {
        mock.script_reply(format!("AT+CMGD={index}\r").as_bytes(), b"\r\nOK\r\n");
    }
}

/// Opener that hands out clones of named mocks and counts opens.
#[derive(Clone, Default)]
pub struct MockOpener {
    ports: Arc<Mutex<HashMap<String, MockSerialPort>>>,
    opens: Arc<AtomicUsize>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(self, port: &MockSerialPort, name: &str) -> Self {
        self.ports.lock().insert(name.to_string(), port.clone());
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortOpener for MockOpener {
    fn open(
        &self,
        port_name: &str,
        _settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.ports.lock().get(port_name) {
            Some(port) => Ok(Box::new(port.clone())),
            None => Err(PortError::not_found(port_name)),
        }
    }
}

/// Session on `mock` with short timeouts.
pub fn session_on(mock: &MockSerialPort) -> ModemSession {
    let opener = MockOpener::new().with_port(mock, "MOCK0");
    session_with_opener(opener)
}

pub fn session_with_opener(opener: MockOpener) -> ModemSession {
    ModemSession::new("MOCK0", PortSettings::default(), Arc::new(opener))
        .with_command_timeout(Duration::from_millis(50))
        .with_read_poll(Duration::from_millis(1))
}

pub fn shared_session(mock: &MockSerialPort) -> Arc<Mutex<ModemSession>> {
    Arc::new(Mutex::new(session_on(mock)))
}

/// Bus transport that records every publish.
#[derive(Default)]
pub struct RecordingBus {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    fail: AtomicBool,
    disconnected: AtomicBool,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn was_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BusClient for RecordingBus {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::NotConnected("broker rejected publish".into()));
        }
        self.sent.lock().push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Run `fut` with a generous upper bound so a hang fails the test instead.
pub async fn bounded<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("test step timed out")
}
