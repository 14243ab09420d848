//! MIME-to-model mapping (§4.5)
//!
//! Turns a message's raw bytes into a [`MappedMessage`] the ingest worker can
//! hand to the store. Never fails: a message that does not parse as MIME at
//! all still produces a `MappedMessage` with a synthesized placeholder body,
//! because the raw bytes are stored regardless of whether they parse.

use chrono::{DateTime, TimeZone, Utc};
use encoding_rs::Encoding;
use mail_parser::{Address, ContentType, Message, MessagePart, MessageParser};

/// One parsed participant: a decoded address plus an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedParticipant {
    pub email: String,
    pub display_name: Option<String>,
}

/// One decoded attachment part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedAttachment {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// The result of mapping one message's raw bytes to model-ready fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedMessage {
    pub subject: String,
    pub snippet: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// The message's send time, from the envelope `Date` header. `None` if
    /// absent or unparseable — the caller falls back to a provider-internal
    /// timestamp (§4.5).
    pub sent_at: Option<DateTime<Utc>>,
    /// A stable key identifying the message's thread, used to resolve
    /// `RemoteThreadId` when the provider does not supply one natively.
    pub thread_key: String,
    pub from: Option<MappedParticipant>,
    pub to: Vec<MappedParticipant>,
    pub cc: Vec<MappedParticipant>,
    pub bcc: Vec<MappedParticipant>,
    pub attachments: Vec<MappedAttachment>,
    /// Set if the raw bytes did not parse as MIME at all; `subject`/`snippet`
    /// are synthesized placeholders in that case, not absent fields.
    pub parse_error: Option<String>,
}

const SNIPPET_PLACEHOLDER_LEN: usize = 80;

/// Maps `raw` (a message's raw bytes, as returned by a `RemoteAdapter`) into
/// a [`MappedMessage`]. Always returns a value; never panics on malformed
/// input.
pub fn map_message(raw: &[u8]) -> MappedMessage {
    match MessageParser::default().parse(raw) {
        Some(message) => map_parsed(&message),
        None => placeholder(raw),
    }
}

fn placeholder(raw: &[u8]) -> MappedMessage {
    tracing::warn!(bytes = raw.len(), "message failed to parse as MIME, storing placeholder");
    let first_line = ensure_utf8(raw)
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(SNIPPET_PLACEHOLDER_LEN)
        .collect::<String>();
    let snippet = if first_line.trim().is_empty() {
        "(MIME parse error)".to_string()
    } else {
        first_line
    };
    MappedMessage {
        subject: snippet.clone(),
        snippet,
        body_text: None,
        body_html: None,
        sent_at: None,
        thread_key: synthesize_thread_key(None),
        from: None,
        to: Vec::new(),
        cc: Vec::new(),
        bcc: Vec::new(),
        attachments: Vec::new(),
        parse_error: Some("message could not be parsed as MIME".to_string()),
    }
}

fn map_parsed(message: &Message<'_>) -> MappedMessage {
    let subject = message.subject().map(str::to_string).unwrap_or_default();
    let subject = if subject.is_empty() { "(no subject)".to_string() } else { subject };

    let body_text = body_text_of(message);
    let body_html = body_html_of(message);
    let snippet = snippet_from(body_text.as_deref(), body_html.as_deref(), &subject);

    let sent_at = message.date().and_then(|dt| Utc.timestamp_opt(dt.to_timestamp(), 0).single());

    let thread_key = synthesize_thread_key(message.message_id());

    let from = message
        .from()
        .and_then(|addr| flatten_addresses(addr).into_iter().next());
    let to = message.to().map(flatten_addresses).unwrap_or_default();
    let cc = message.cc().map(flatten_addresses).unwrap_or_default();
    let bcc = message.bcc().map(flatten_addresses).unwrap_or_default();

    let attachments = message
        .attachments()
        .map(|part| MappedAttachment {
            filename: part
                .attachment_name()
                .map(|n| ensure_utf8(n.as_bytes()))
                .unwrap_or_else(|| "attachment".to_string()),
            media_type: content_type_string(part.content_type()),
            bytes: part.contents().to_vec(),
        })
        .collect();

    MappedMessage {
        subject,
        snippet,
        body_text,
        body_html,
        sent_at,
        thread_key,
        from,
        to,
        cc,
        bcc,
        attachments,
        parse_error: None,
    }
}

fn body_text_of(message: &Message<'_>) -> Option<String> {
    message.text_bodies().next().map(|part| decode_part(part))
}

fn body_html_of(message: &Message<'_>) -> Option<String> {
    message.html_bodies().next().map(|part| decode_part(part))
}

/// Decodes one body part's raw bytes through the UTF-8 fallback chain,
/// using the part's declared charset as the first candidate.
fn decode_part(part: &MessagePart<'_>) -> String {
    let charset_hint = part.content_type().and_then(|ct| ct.c_param("charset"));
    ensure_utf8_with_hint(part.contents(), charset_hint)
}

fn content_type_string(ct: Option<&ContentType>) -> String {
    match ct {
        Some(ct) => match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
            None => ct.ctype().to_string(),
        },
        None => "application/octet-stream".to_string(),
    }
}

fn flatten_addresses(address: &Address<'_>) -> Vec<MappedParticipant> {
    match address {
        Address::List(addrs) => addrs
            .iter()
            .filter_map(|addr| {
                addr.address().map(|email| MappedParticipant {
                    email: email.to_string(),
                    display_name: addr.name().map(|n| ensure_utf8(n.as_bytes())),
                })
            })
            .collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter())
            .filter_map(|addr| {
                addr.address().map(|email| MappedParticipant {
                    email: email.to_string(),
                    display_name: addr.name().map(|n| ensure_utf8(n.as_bytes())),
                })
            })
            .collect(),
    }
}

fn snippet_from(text: Option<&str>, html: Option<&str>, subject: &str) -> String {
    let source = text.or(html).unwrap_or(subject);
    source
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_PLACEHOLDER_LEN)
        .collect()
}

/// Resolves a stable thread key: the message's own `Message-ID` if present
/// (§4.5 — providers without a native thread id group by this), else a
/// freshly synthesized id for a message with neither.
fn synthesize_thread_key(message_id: Option<&str>) -> String {
    message_id
        .map(str::to_string)
        .unwrap_or_else(|| format!("untethered-{}", uuid::Uuid::new_v4()))
}

/// Decodes `bytes` to UTF-8, trying the declared charset first, then
/// Windows-1252, then Latin-1, then falling back to lossy UTF-8 with
/// U+FFFD replacement characters (§4.5).
pub fn ensure_utf8(bytes: &[u8]) -> String {
    ensure_utf8_with_hint(bytes, None)
}

/// Same as [`ensure_utf8`] but tries `charset_hint` (from a `Content-Type`
/// header) before falling through the rest of the chain.
pub fn ensure_utf8_with_hint(bytes: &[u8], charset_hint: Option<&str>) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    if let Some(hint) = charset_hint {
        if let Some(encoding) = Encoding::for_label(hint.as_bytes()) {
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if !had_errors {
                return decoded.into_owned();
            }
        }
    }

    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }

    let (decoded, _, had_errors) = encoding_rs::Encoding::for_label(b"iso-8859-1")
        .expect("iso-8859-1 is a built-in encoding_rs label")
        .decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &str, body: &str) -> Vec<u8> {
        format!("{headers}\r\n\r\n{body}").into_bytes()
    }

    #[test]
    fn maps_simple_plain_text_message() {
        let bytes = raw(
            "From: Alice <alice@example.com>\r\nTo: bob@example.com\r\nSubject: Hello\r\nMessage-ID: <m1@example.com>\r\nContent-Type: text/plain",
            "Hi Bob, how are you?",
        );
        let mapped = map_message(&bytes);
        assert_eq!(mapped.subject, "Hello");
        assert_eq!(mapped.from.unwrap().email, "alice@example.com");
        assert_eq!(mapped.to[0].email, "bob@example.com");
        assert_eq!(mapped.body_text.as_deref(), Some("Hi Bob, how are you?"));
        assert!(mapped.parse_error.is_none());
    }

    #[test]
    fn missing_subject_gets_placeholder() {
        let bytes = raw("From: a@example.com\r\nTo: b@example.com", "body text here");
        let mapped = map_message(&bytes);
        assert_eq!(mapped.subject, "(no subject)");
    }

    #[test]
    fn thread_key_uses_message_id() {
        let bytes = raw(
            "From: a@example.com\r\nTo: b@example.com\r\nMessage-ID: <only@example.com>\r\nSubject: New thread",
            "body",
        );
        let mapped = map_message(&bytes);
        assert_eq!(mapped.thread_key, "only@example.com");
    }

    #[test]
    fn unparseable_bytes_synthesize_placeholder_and_preserve_raw() {
        let bytes: Vec<u8> = vec![0xff, 0xfe, 0x00, 0x01, 0x02];
        let mapped = map_message(&bytes);
        assert!(mapped.parse_error.is_some());
        assert!(mapped.body_text.is_none());
    }

    #[test]
    fn ensure_utf8_passes_through_valid_utf8() {
        assert_eq!(ensure_utf8("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn ensure_utf8_falls_back_to_windows_1252() {
        // 0x93/0x94 are curly quotes in Windows-1252, invalid as UTF-8 leads.
        let bytes = [0x93u8, b'h', b'i', 0x94];
        let decoded = ensure_utf8(&bytes);
        assert!(decoded.contains("hi"));
        assert!(!decoded.contains('\u{FFFD}'));
    }

    #[test]
    fn attachments_are_classified_separately_from_body() {
        let bytes = raw(
            "From: a@example.com\r\nTo: b@example.com\r\nSubject: With attachment\r\nContent-Type: multipart/mixed; boundary=XYZ",
            "--XYZ\r\nContent-Type: text/plain\r\n\r\nbody text\r\n--XYZ\r\nContent-Type: application/pdf\r\nContent-Disposition: attachment; filename=report.pdf\r\n\r\n%PDF-1.4\r\n--XYZ--",
        );
        let mapped = map_message(&bytes);
        assert_eq!(mapped.body_text.as_deref(), Some("body text"));
        assert_eq!(mapped.attachments.len(), 1);
        assert_eq!(mapped.attachments[0].filename, "report.pdf");
    }
}
