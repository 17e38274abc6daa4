//! Mock serial port implementation for testing.
//!
//! `MockSerialPort` simulates a modem without hardware. Besides plain read
//! queues it supports scripted replies: a reply is queued only once the
//! matching command has been written, which is how a real modem behaves and
//! keeps replies to consecutive commands from running together.

use super::error::PortError;
use super::traits::SerialPortAdapter;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes returned by read operations.
    read_queue: VecDeque<u8>,
    /// Every write, in order.
    write_log: Vec<Vec<u8>>,
    /// (command, reply) pairs consumed in order as matching commands arrive.
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
    /// Error kind injected into the next write.
    fail_next_write: Option<io::ErrorKind>,
    /// Error kind injected into the next read.
    fail_next_read: Option<io::ErrorKind>,
    /// Whether the next read should time out.
    should_timeout: bool,
    timeout: Duration,
    buffers_cleared: bool,
}

/// Mock serial port implementation for testing.
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another.
///
/// # Example
/// ```
/// use sms_relay::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.script_reply(b"AT\r", b"\r\nOK\r\n");
///
/// port.write_bytes(b"AT\r").unwrap();
///
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"\r\nOK\r\n");
/// assert_eq!(port.get_write_log(), vec![b"AT\r".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(100),
                ..Default::default()
            })),
        }
    }

    /// Enqueue bytes to be returned by subsequent reads, regardless of writes.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.read_queue.extend(data);
    }

    /// Queue `reply` for reading once `command` is written.
    ///
    /// Script entries are consumed in order. A write that does not match the
    /// next entry gets no reply, like a modem ignoring garbage.
    pub fn script_reply(&mut self, command: &[u8], reply: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.script.push_back((command.to_vec(), reply.to_vec()));
    }

    /// Number of scripted replies not yet triggered.
    pub fn pending_script(&self) -> usize {
        self.state.lock().unwrap().script.len()
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// Writes rendered as lossy UTF-8, convenient for asserting AT commands.
    pub fn written_commands(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .write_log
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Make the next write fail with an I/O error of `kind`.
    pub fn fail_next_write(&mut self, kind: io::ErrorKind) {
        self.state.lock().unwrap().fail_next_write = Some(kind);
    }

    /// Make the next read fail with an I/O error of `kind`.
    pub fn fail_next_read(&mut self, kind: io::ErrorKind) {
        self.state.lock().unwrap().fail_next_read = Some(kind);
    }

    /// Set whether the next read operation should time out.
    pub fn set_should_timeout(&mut self, should_timeout: bool) {
        self.state.lock().unwrap().should_timeout = should_timeout;
    }

    /// Get whether buffers have been cleared since creation.
    pub fn was_cleared(&self) -> bool {
        self.state.lock().unwrap().buffers_cleared
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().unwrap().read_queue.len()
    }

    /// Number of live handles sharing this port's state.
    ///
    /// A test that keeps one handle sees `1` once the code under test has
    /// dropped (closed) every port it opened.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock().unwrap();

        if let Some(kind) = state.fail_next_write.take() {
            return Err(PortError::Io(io::Error::new(kind, "injected write failure")));
        }

        state.write_log.push(data.to_vec());

        let matches_next = state
            .script
            .front()
            .map(|(command, _)| command.as_slice() == data)
            .unwrap_or(false);
        if matches_next {
            if let Some((_, reply)) = state.script.pop_front() {
                state.read_queue.extend(reply);
            }
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock().unwrap();

        if let Some(kind) = state.fail_next_read.take() {
            return Err(PortError::Io(io::Error::new(kind, "injected read failure")));
        }

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            Err(PortError::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        state.read_queue.clear();
        state.buffers_cleared = true;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"OK\r\n");

        let mut buffer = [0u8; 10];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"OK\r\n");
    }

    #[test]
    fn test_scripted_reply_only_after_matching_write() {
        let mut port = MockSerialPort::new("MOCK0");
        port.script_reply(b"AT+CMGF=1\r", b"OK\r\n");
        assert_eq!(port.available_bytes(), 0);

        port.write_bytes(b"AT\r").unwrap();
        assert_eq!(port.available_bytes(), 0);
        assert_eq!(port.pending_script(), 1);

        port.write_bytes(b"AT+CMGF=1\r").unwrap();
        assert_eq!(port.available_bytes(), 4);
        assert_eq!(port.pending_script(), 0);
    }

    #[test]
    fn test_injected_failures_fire_once() {
        let mut port = MockSerialPort::new("MOCK0");
        port.fail_next_write(io::ErrorKind::BrokenPipe);

        assert!(port.write_bytes(b"AT\r").is_err());
        assert!(port.write_bytes(b"AT\r").is_ok());

        port.fail_next_read(io::ErrorKind::BrokenPipe);
        let mut buffer = [0u8; 4];
        match port.read_bytes(&mut buffer) {
            Err(PortError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected injected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_simulation() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_should_timeout(true);

        let mut buffer = [0u8; 10];
        let result = port.read_bytes(&mut buffer);
        assert!(matches!(result, Err(PortError::Timeout(_))));
    }

    #[test]
    fn test_empty_read_would_block() {
        let mut port = MockSerialPort::new("MOCK0");
        let mut buffer = [0u8; 10];

        let err = port.read_bytes(&mut buffer).unwrap_err();
        assert!(err.is_idle());
    }

    #[test]
    fn test_clear_buffers() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"stale");

        port.clear_buffers().unwrap();
        assert!(port.was_cleared());
        assert_eq!(port.available_bytes(), 0);
    }

    #[test]
    fn test_handle_count_tracks_clones() {
        let port = MockSerialPort::new("MOCK0");
        assert_eq!(port.handle_count(), 1);

        let clone = port.clone();
        assert_eq!(port.handle_count(), 2);

        drop(clone);
        assert_eq!(port.handle_count(), 1);
    }
}
