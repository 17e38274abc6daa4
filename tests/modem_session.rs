//! Modem session tests against a scripted mock modem.

mod common;

use common::{
    header, listing, mock_modem, script_cycle, session_on, session_with_opener, MockOpener,
    LIST_UNREAD,
};
use pretty_assertions::assert_eq;
use sms_relay::modem::{ModemError, SessionState};
use std::io;

#[test]
fn test_poll_reads_and_deletes_unread_record() {
    let mut mock = mock_modem("MOCK0");
    let reply = listing(&[(
        header(3, "REC UNREAD", "+15550001234", "24/01/15", "10:30:00"),
        "Hello",
    )]);
    script_cycle(&mut mock, &reply, &[3]);
    let mut session = session_on(&mock);

    let messages = session.list_unread().unwrap();

    assert_eq!(messages.len(), 1);
    let record = messages[0].to_record();
    assert_eq!(record.sender, "+15550001234");
    assert_eq!(record.body, "Hello\n");
    assert_eq!(record.timestamp, 1_705_314_600);

    assert_eq!(
        mock.written_commands(),
        vec!["AT+CMGF=1\r", "AT+CMGL=\"REC UNREAD\"\r", "AT+CMGD=3\r"]
    );
    assert_eq!(mock.pending_script(), 0);
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn test_multi_line_bodies_and_several_records() {
    let mut mock = mock_modem("MOCK0");
    let reply = listing(&[
        (
            header(1, "REC UNREAD", "+15550001111", "24/01/15", "10:30:00"),
            "first line\r\nsecond line",
        ),
        (
            header(2, "REC UNREAD", "+15550002222", "24/01/15", "10:31:00"),
            "short",
        ),
    ]);
    script_cycle(&mut mock, &reply, &[1, 2]);
    let mut session = session_on(&mock);

    let messages = session.list_unread().unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].body, "first line\nsecond line\n");
    assert_eq!(messages[1].sender, "+15550002222");
    assert_eq!(messages[1].timestamp.timestamp(), 1_705_314_660);
    assert!(mock
        .written_commands()
        .ends_with(&["AT+CMGD=1\r".to_string(), "AT+CMGD=2\r".to_string()]));
}

#[test]
fn test_read_and_malformed_records_stay_on_modem() {
    let mut mock = mock_modem("MOCK0");
    let reply = listing(&[
        (
            header(1, "REC READ", "+15550001111", "24/01/15", "10:30:00"),
            "already seen",
        ),
        ("+CMGL: 2,\"REC UNREAD\",\"+1555\"\r\n".to_string(), "truncated"),
        (
            header(3, "REC UNREAD", "+15550003333", "24/01/15", "10:32:00"),
            "keep me",
        ),
    ]);
    script_cycle(&mut mock, &reply, &[3]);
    let mut session = session_on(&mock);

    let messages = session.list_unread().unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].index, 3);
    assert_eq!(messages[0].body, "keep me\n");
    let deletes: Vec<_> = mock
        .written_commands()
        .into_iter()
        .filter(|c| c.starts_with("AT+CMGD"))
        .collect();
    assert_eq!(deletes, vec!["AT+CMGD=3\r"]);
}

#[test]
fn test_error_line_in_body_does_not_end_listing() {
    let mut mock = mock_modem("MOCK0");
    let reply = listing(&[
        (
            header(1, "REC UNREAD", "+15550001111", "24/01/15", "10:30:00"),
            "ERROR",
        ),
        (
            header(2, "REC UNREAD", "+15550002222", "24/01/15", "10:31:00"),
            "real message",
        ),
    ]);
    script_cycle(&mut mock, &reply, &[2]);
    let mut session = session_on(&mock);

    let messages = session.list_unread().unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].index, 2);
    assert_eq!(messages[0].body, "real message\n");
    assert_eq!(mock.pending_script(), 0);
}

#[test]
fn test_ok_line_in_body_does_not_truncate_later_records() {
    let long_body = "x".repeat(600);
    let mut mock = mock_modem("MOCK0");
    let reply = listing(&[
        (
            header(1, "REC UNREAD", "+15550001111", "24/01/15", "10:30:00"),
            "OK",
        ),
        (
            header(2, "REC UNREAD", "+15550002222", "24/01/15", "10:31:00"),
            long_body.as_str(),
        ),
    ]);
    script_cycle(&mut mock, &reply, &[2]);
    let mut session = session_on(&mock);

    let messages = session.list_unread().unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].index, 2);
    assert_eq!(messages[0].body.len(), 601);
    assert_eq!(messages[0].body, format!("{long_body}\n"));
}

#[test]
fn test_error_reply_yields_empty_list() {
    let mut mock = mock_modem("MOCK0");
    mock.script_reply(LIST_UNREAD, b"\r\n+CMS ERROR: 321\r\n");
    let mut session = session_on(&mock);

    let messages = session.list_unread().unwrap();

    assert!(messages.is_empty());
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn test_silent_modem_times_out_to_empty_list() {
    let mock = mock_modem("MOCK0");
    let mut session = session_on(&mock);

    let messages = session.list_unread().unwrap();

    assert!(messages.is_empty());
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn test_transport_fault_reopens_and_reinitializes() {
    let mut mock = mock_modem("MOCK0");
    mock.script_reply(b"AT+CMGF=1\r", b"\r\nOK\r\n");
    let reply = listing(&[(
        header(3, "REC UNREAD", "+15550001234", "24/01/15", "10:30:00"),
        "Hello",
    )]);
    script_cycle(&mut mock, &reply, &[3]);

    let opener = MockOpener::new().with_port(&mock, "MOCK0");
    let mut session = session_with_opener(opener.clone());

    session.ensure_ready().unwrap();
    mock.fail_next_write(io::ErrorKind::BrokenPipe);
    let err = session.list_unread().unwrap_err();
    assert!(matches!(err, ModemError::Port(_)));
    assert_eq!(session.state(), SessionState::Disconnected);

    let messages = session.list_unread().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(opener.opens(), 2);
    assert_eq!(
        mock.written_commands(),
        vec![
            "AT+CMGF=1\r",
            "AT+CMGF=1\r",
            "AT+CMGL=\"REC UNREAD\"\r",
            "AT+CMGD=3\r"
        ]
    );
}

#[test]
fn test_open_failure_surfaces_as_error() {
    let mut session = session_with_opener(MockOpener::new());

    let err = session.list_unread().unwrap_err();
    assert!(matches!(err, ModemError::Port(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_delete_without_connection_is_refused() {
    let mock = mock_modem("MOCK0");
    let mut session = session_on(&mock);

    assert!(!session.delete(5));
    assert!(mock.written_commands().is_empty());
}

#[test]
fn test_close_releases_port() {
    let mock = mock_modem("MOCK0");
    let mut session = session_on(&mock);
    session.ensure_ready().unwrap();
    let open_handles = mock.handle_count();

    session.close();

    assert_eq!(mock.handle_count(), open_handles - 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}
