//! Topic derivation for published messages.

/// Keep only the ASCII digits of a sender address.
///
/// Alphanumeric senders ("BANK") normalize to an empty string.
pub fn normalize_sender(sender: &str) -> String {
    sender.chars().filter(char::is_ascii_digit).collect()
}

/// `<namespace>/<digits>/<timestamp>`
pub fn routing_key(namespace: &str, sender: &str, timestamp: i64) -> String {
    format!(
        "{}/{}/{}",
        namespace.trim_end_matches('/'),
        normalize_sender(sender),
        timestamp
    )
}
