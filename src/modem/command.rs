//! AT command vocabulary and reply framing.
//!
//! Replies have no length prefix; a reply is complete once a line consisting
//! of a final result code has arrived.

/// Liveness probe.
pub const PROBE: &str = "AT";

/// Token a healthy modem answers the probe with.
pub const PROBE_REPLY: &str = "OK";

/// Switch message format to text mode.
pub const TEXT_MODE: &str = "AT+CMGF=1";

/// List records still marked unread.
pub const LIST_UNREAD: &str = "AT+CMGL=\"REC UNREAD\"";

/// Delete the record stored at `index`.
pub fn delete(index: u32) -> String {
    format!("AT+CMGD={index}")
}

/// Bytes put on the wire for `command`.
pub fn encode(command: &str) -> Vec<u8> {
    format!("{command}\r").into_bytes()
}

/// Final result code closing a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Ok,
    Error,
}

/// Classify one trimmed line.
pub fn classify_line(line: &str) -> Option<Terminator> {
    let line = line.trim();
    if line == "OK" {
        Some(Terminator::Ok)
    } else if line == "ERROR" || line.starts_with("+CMS ERROR") || line.starts_with("+CME ERROR")
    {
        Some(Terminator::Error)
    } else {
        None
    }
}

/// Final result code closing `buffer`, if its last complete line is one.
///
/// Only the last non-empty line counts. Message bodies are free text and
/// may contain lines such as `OK` or `ERROR` before the real result code.
/// A trailing fragment without a line break is ignored: it may still grow
/// into something that is not a terminator.
pub fn find_terminator(buffer: &str) -> Option<Terminator> {
    let complete = match buffer.rfind(['\r', '\n']) {
        Some(end) => &buffer[..end],
        None => return None,
    };

    complete
        .split(['\r', '\n'])
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(classify_line)
}
