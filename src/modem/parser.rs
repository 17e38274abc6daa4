//! Parser for `+CMGL` list replies.
//!
//! A reply is a flat sequence of lines. A header line opens a record and
//! every following free-text line belongs to it until the next header or
//! the final result code:
//!
//! ```text
//! +CMGL: 3,"REC UNREAD","+15550001234",,"24/01/15","10:30:00+00"
//! Hello
//! +CMGL: 4,"REC UNREAD","Bank, Inc.",,"24/01/15,11:02:41+04"
//! Your code is 1234
//! OK
//! ```
//!
//! Quoted fields may contain commas. Some firmware quotes date and time
//! together in one field, which is split back into two before counting.

use super::command;
use super::error::ParseError;
use crate::message::{RecordStatus, SmsMessage};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Prefix of a list-record header line.
pub const HEADER_PREFIX: &str = "+CMGL:";

/// index, status, sender, alpha, date, time.
pub const MIN_HEADER_FIELDS: usize = 6;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})(?:([+-])(\d{1,2}))?$").expect("valid time regex")
});

/// Parsed header of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListHeader {
    pub index: u32,
    pub status: RecordStatus,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

/// Split on commas outside double quotes. Fields are trimmed, quotes kept.
pub fn split_fields(input: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

/// Parse the modem clock into an instant.
///
/// `date` is `yy/MM/dd`; `time` is `hh:mm:ss` with an optional zone offset
/// in quarter hours (`+04` is UTC+1). Without an offset the clock is taken
/// as UTC.
pub fn parse_timestamp(date: &str, time: &str) -> Result<DateTime<Utc>, ParseError> {
    let invalid = || ParseError::InvalidTimestamp {
        date: date.to_string(),
        time: time.to_string(),
    };

    let day = NaiveDate::parse_from_str(date.trim(), "%y/%m/%d").map_err(|_| invalid())?;
    let caps = TIME_RE.captures(time.trim()).ok_or_else(invalid)?;

    let number = |i: usize| -> Result<u32, ParseError> {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(invalid)
    };
    let clock = NaiveTime::from_hms_opt(number(1)?, number(2)?, number(3)?).ok_or_else(invalid)?;
    let local = day.and_time(clock);

    match caps.get(4) {
        None => Ok(local.and_utc()),
        Some(sign) => {
            let quarters = number(5)? as i32;
            let seconds = quarters * 15 * 60;
            let seconds = if sign.as_str() == "-" { -seconds } else { seconds };
            let offset = FixedOffset::east_opt(seconds).ok_or_else(invalid)?;
            local
                .and_local_timezone(offset)
                .single()
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(invalid)
        }
    }
}

/// Parse one `+CMGL:` header line.
///
/// A missing or malformed date yields the Unix epoch rather than an error.
pub fn parse_header(line: &str) -> Result<ListHeader, ParseError> {
    let rest = line
        .trim()
        .strip_prefix(HEADER_PREFIX)
        .ok_or_else(|| ParseError::NotAHeader(line.to_string()))?;

    let mut fields = split_fields(rest);

    // Combined "yy/MM/dd,hh:mm:ss+zz" in the date position.
    if let Some(combined) = fields.get(4).map(|f| unquote(f).to_string()) {
        if let Some((date, time)) = combined.split_once(',') {
            fields.splice(4..5, [date.to_string(), time.to_string()]);
        }
    }

    if fields.len() < MIN_HEADER_FIELDS {
        return Err(ParseError::TooFewFields {
            found: fields.len(),
            expected: MIN_HEADER_FIELDS,
            line: line.to_string(),
        });
    }

    let index = unquote(&fields[0])
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidIndex(fields[0].clone()))?;

    let date = unquote(&fields[4]);
    let time = unquote(&fields[5]);
    let timestamp = parse_timestamp(date, time).unwrap_or_else(|e| {
        debug!("Record {} has no usable timestamp ({}), using epoch", index, e);
        DateTime::<Utc>::UNIX_EPOCH
    });

    Ok(ListHeader {
        index,
        status: RecordStatus::from_field(unquote(&fields[1])),
        sender: unquote(&fields[2]).to_string(),
        timestamp,
    })
}

struct OpenRecord {
    header: ListHeader,
    body: String,
}

impl OpenRecord {
    fn into_message(self) -> SmsMessage {
        SmsMessage {
            index: self.header.index,
            status: self.header.status,
            sender: self.header.sender,
            timestamp: self.header.timestamp,
            body: self.body,
        }
    }
}

fn flush(record: Option<OpenRecord>, out: &mut Vec<SmsMessage>) {
    if let Some(record) = record {
        let message = record.into_message();
        if message.is_forwardable() {
            out.push(message);
        } else {
            debug!(
                "Skipping record {} (status {}, {} body bytes)",
                message.index,
                message.status,
                message.body.len()
            );
        }
    }
}

/// Turn a complete list reply into the unread messages it carries.
///
/// Records that are not unread or have an empty body are skipped. A bad
/// header drops its own record only; parsing resumes at the next header.
pub fn parse_list_response(payload: &str) -> Vec<SmsMessage> {
    let mut messages = Vec::new();
    let mut current: Option<OpenRecord> = None;

    for raw in payload.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(HEADER_PREFIX) {
            flush(current.take(), &mut messages);
            match parse_header(line) {
                Ok(header) => {
                    current = Some(OpenRecord {
                        header,
                        body: String::new(),
                    })
                }
                Err(e) => warn!("Dropping SMS record: {}", e),
            }
        } else if command::classify_line(line).is_some() {
            continue;
        } else if let Some(record) = current.as_mut() {
            record.body.push_str(line);
            record.body.push('\n');
        }
    }
    flush(current.take(), &mut messages);

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_fields_respects_quotes() {
        let fields = split_fields(r#" 4,"REC UNREAD","Bank, Inc.",,"24/01/15""#);
        assert_eq!(
            fields,
            vec!["4", "\"REC UNREAD\"", "\"Bank, Inc.\"", "", "\"24/01/15\""]
        );
    }

    #[test]
    fn test_parse_timestamp_with_zero_offset() {
        let ts = parse_timestamp("24/01/15", "10:30:00+00").unwrap();
        assert_eq!(ts.timestamp(), 1_705_314_600);
    }

    #[test]
    fn test_parse_timestamp_applies_quarter_hour_offset() {
        // +08 quarter hours = UTC+2
        let ts = parse_timestamp("24/01/15", "10:30:00+08").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap());

        let ts = parse_timestamp("24/01/15", "10:30:00-20").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_without_offset_is_utc() {
        let ts = parse_timestamp("23/11/14", "22:13:20").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("", "").is_err());
        assert!(parse_timestamp("24/13/40", "10:30:00").is_err());
        assert!(parse_timestamp("24/01/15", "25:61:00").is_err());
        assert!(parse_timestamp("yesterday", "10:30:00").is_err());
    }

    #[test]
    fn test_parse_header_separate_date_and_time() {
        let header =
            parse_header(r#"+CMGL: 3,"REC UNREAD","+15550001234",,"24/01/15","10:30:00+00""#)
                .unwrap();
        assert_eq!(header.index, 3);
        assert_eq!(header.status, RecordStatus::Unread);
        assert_eq!(header.sender, "+15550001234");
        assert_eq!(header.timestamp.timestamp(), 1_705_314_600);
    }

    #[test]
    fn test_parse_header_combined_date_time_field() {
        let header =
            parse_header(r#"+CMGL: 7,"REC UNREAD","+15550001234",,"24/01/15,10:30:00+00""#)
                .unwrap();
        assert_eq!(header.index, 7);
        assert_eq!(header.timestamp.timestamp(), 1_705_314_600);
    }

    #[test]
    fn test_parse_header_malformed_date_defaults_to_epoch() {
        let header = parse_header(r#"+CMGL: 1,"REC UNREAD","+1555",,"not a date","??""#).unwrap();
        assert_eq!(header.timestamp, DateTime::<Utc>::UNIX_EPOCH);

        let header = parse_header(r#"+CMGL: 1,"REC UNREAD","+1555",,"","""#).unwrap();
        assert_eq!(header.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_parse_header_too_few_fields() {
        let err = parse_header(r#"+CMGL: 1,"REC UNREAD","+1555""#).unwrap_err();
        assert!(matches!(
            err,
            ParseError::TooFewFields {
                found: 3,
                expected: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_header_bad_index() {
        let err = parse_header(r#"+CMGL: x,"REC UNREAD","+1555",,"24/01/15","10:30:00""#)
            .unwrap_err();
        assert_eq!(err, ParseError::InvalidIndex("x".into()));
    }

    #[test]
    fn test_single_record() {
        let payload = "AT+CMGL=\"REC UNREAD\"\r\n\
            +CMGL: 3,\"REC UNREAD\",\"+15550001234\",,\"24/01/15\",\"10:30:00+00\"\r\n\
            Hello\r\n\
            \r\n\
            OK\r\n";

        let messages = parse_list_response(payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].index, 3);
        assert_eq!(messages[0].sender, "+15550001234");
        assert_eq!(messages[0].body, "Hello\n");
        assert_eq!(messages[0].timestamp.timestamp(), 1_705_314_600);
    }

    #[test]
    fn test_multi_line_bodies_and_order() {
        let payload = "+CMGL: 1,\"REC UNREAD\",\"+111\",,\"24/01/15\",\"10:00:00\"\r\n\
            line one\r\n\
            line two\r\n\
            +CMGL: 2,\"REC UNREAD\",\"+222\",,\"24/01/15\",\"10:01:00\"\r\n\
            second\r\n\
            OK\r\n";

        let messages = parse_list_response(payload);
        let summary: Vec<(u32, &str)> = messages
            .iter()
            .map(|m| (m.index, m.body.as_str()))
            .collect();
        assert_eq!(summary, vec![(1, "line one\nline two\n"), (2, "second\n")]);
    }

    #[test]
    fn test_skips_read_and_empty_records() {
        let payload = "+CMGL: 1,\"REC READ\",\"+111\",,\"24/01/15\",\"10:00:00\"\r\n\
            already seen\r\n\
            +CMGL: 2,\"REC UNREAD\",\"+222\",,\"24/01/15\",\"10:01:00\"\r\n\
            +CMGL: 3,\"REC UNREAD\",\"+333\",,\"24/01/15\",\"10:02:00\"\r\n\
            kept\r\n\
            OK\r\n";

        let messages = parse_list_response(payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].index, 3);
    }

    #[test]
    fn test_short_header_dropped_parsing_continues() {
        let payload = "+CMGL: 1,\"REC UNREAD\"\r\n\
            orphan body\r\n\
            +CMGL: 2,\"REC UNREAD\",\"+222\",,\"24/01/15\",\"10:01:00\"\r\n\
            survivor\r\n\
            OK\r\n";

        let messages = parse_list_response(payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].index, 2);
        assert_eq!(messages[0].body, "survivor\n");
    }

    #[test]
    fn test_terminators_never_enter_bodies() {
        let payload = "+CMGL: 5,\"REC UNREAD\",\"+555\",,\"24/01/15\",\"10:00:00\"\r\n\
            body\r\n\
            ERROR\r\n\
            OK\r\n";

        let messages = parse_list_response(payload);
        assert_eq!(messages[0].body, "body\n");
    }

    #[test]
    fn test_sender_with_embedded_comma() {
        let payload = "+CMGL: 9,\"REC UNREAD\",\"Bank, Inc.\",\"x,y\",\"24/01/15\",\"10:00:00\"\r\n\
            code 1234\r\n\
            OK\r\n";

        let messages = parse_list_response(payload);
        assert_eq!(messages[0].sender, "Bank, Inc.");
    }

    #[test]
    fn test_empty_payload() {
        assert!(parse_list_response("OK\r\n").is_empty());
        assert!(parse_list_response("").is_empty());
    }
}
