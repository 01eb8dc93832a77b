//! Raw RFC 822 bytes → envelope fields.
//!
//! `normalize` never fails. Input mail-parser cannot make sense of comes
//! back as a degraded record: empty headers, the raw bytes as lossy text,
//! and the current time.
//!
//! A message without a usable Date header takes the server's receive time,
//! then the current time.

use chrono::{DateTime, Utc};
use mail_parser::{Address, Message, MessageParser};

/// Header and body fields of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFields {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub date: DateTime<Utc>,
}

/// Parse a raw message. `received` is the server-side arrival time, if known.
pub fn normalize(raw: &[u8], received: Option<DateTime<Utc>>) -> NormalizedFields {
    match MessageParser::default().parse(raw) {
        Some(parsed) => from_parsed(&parsed, received),
        None => degraded(raw),
    }
}

/// Fallback record for unparseable input.
pub fn degraded(raw: &[u8]) -> NormalizedFields {
    NormalizedFields {
        subject: String::new(),
        from: String::new(),
        to: String::new(),
        body: String::from_utf8_lossy(raw).into_owned(),
        date: Utc::now(),
    }
}

fn from_parsed(parsed: &Message<'_>, received: Option<DateTime<Utc>>) -> NormalizedFields {
    let date = parsed
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .or(received)
        .unwrap_or_else(Utc::now);

    NormalizedFields {
        subject: parsed.subject().unwrap_or_default().to_string(),
        from: render_addresses(parsed.from()),
        to: render_addresses(parsed.to()),
        body: extract_body(parsed),
        date,
    }
}

/// `Name <addr>` per mailbox, comma-separated. Group members are flattened.
pub fn render_addresses(addr: Option<&Address<'_>>) -> String {
    let Some(addr) = addr else {
        return String::new();
    };
    let rendered: Vec<String> = match addr {
        Address::List(list) => list.iter().filter_map(render_one).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter().filter_map(render_one))
            .collect(),
    };
    rendered.join(", ")
}

fn render_one(a: &mail_parser::Addr<'_>) -> Option<String> {
    match (a.name.as_deref(), a.address.as_deref()) {
        (Some(name), Some(address)) if !name.is_empty() => Some(format!("{name} <{address}>")),
        (_, Some(address)) => Some(address.to_string()),
        (Some(name), None) if !name.is_empty() => Some(name.to_string()),
        _ => None,
    }
}

/// First text part. mail-parser renders HTML-only messages to text here.
fn extract_body(parsed: &Message<'_>) -> String {
    parsed
        .body_text(0)
        .map(|text| text.into_owned())
        .unwrap_or_default()
}
