//! Notification messages.
//!
//! [`OutboundMessage`] is a fully composed message on its way to the relay.
//! [`OutgoingMessage`] is a message the tracker is still building, which
//! decorators may stamp with extra headers.

use base64::{engine::general_purpose::STANDARD, Engine};
use mailparse::MailHeaderMap;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::Error;

/// Header carrying the id of the ticket a notification belongs to.
pub const TICKET_ID_HEADER: &str = "X-Trac-Ticket-ID";

const CRLF: &str = "\r\n";

/// Rewrite every line ending (`\r\n`, `\r` or `\n`) as CRLF.
pub fn fix_eol(text: &str) -> String {
    static EOL: OnceLock<Regex> = OnceLock::new();
    let eol = EOL.get_or_init(|| Regex::new(r"\r\n|\r|\n").expect("valid regex"));
    eol.replace_all(text, CRLF).into_owned()
}

/// A composed message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Envelope sender.
    pub from: String,
    /// Envelope recipients.
    pub recipients: Vec<String>,
    /// Header and body text as composed.
    pub raw: String,
    /// Ticket the notification is about, if any.
    pub ticket_id: Option<i64>,
    /// The message's own `Message-ID` header.
    pub message_id: Option<String>,
}

impl OutboundMessage {
    /// Build a message with structured ticket and Message-ID fields.
    pub fn new(
        from: impl Into<String>,
        recipients: Vec<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            recipients,
            raw: raw.into(),
            ticket_id: None,
            message_id: None,
        }
    }

    /// Set the ticket id.
    pub fn ticket_id(mut self, ticket_id: i64) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    /// Set the Message-ID.
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Build a message from raw text, reading the ticket id and Message-ID
    /// from its headers.
    pub fn parse(
        from: impl Into<String>,
        recipients: Vec<String>,
        raw: impl Into<String>,
    ) -> Result<Self, Error> {
        let raw = raw.into();
        let (headers, _) = mailparse::parse_headers(raw.as_bytes())?;

        let ticket_id = match headers.get_first_value(TICKET_ID_HEADER) {
            Some(value) => Some(value.trim().parse::<i64>().map_err(|_| {
                Error::MalformedMessage(format!("{TICKET_ID_HEADER} is not a number: {value:?}"))
            })?),
            None => None,
        };
        let message_id = headers
            .get_first_value("Message-ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            from: from.into(),
            recipients,
            raw,
            ticket_id,
            message_id,
        })
    }

    /// Raw text with CRLF line endings, as RFC 2822 requires on the wire.
    pub fn wire_format(&self) -> String {
        fix_eol(&self.raw)
    }
}

/// A message under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    headers: Vec<(String, String)>,
    /// Message body.
    pub body: String,
}

impl OutgoingMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any existing header of the same name.
    ///
    /// Values that are not plain ASCII are written as RFC 2047 encoded-words
    /// in `charset`.
    pub fn set_header(&mut self, name: &str, value: &str, charset: &str) {
        let value = encode_header_value(value, charset);
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }

    /// Value of the header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Render headers and body with CRLF line endings.
    pub fn to_raw(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str(CRLF);
        }
        out.push_str(CRLF);
        out.push_str(&fix_eol(&self.body));
        out
    }
}

fn encode_header_value(value: &str, charset: &str) -> String {
    if value.bytes().all(|b| b.is_ascii() && !b.is_ascii_control()) {
        return value.to_string();
    }
    format!("=?{}?B?{}?=", charset, STANDARD.encode(value.as_bytes()))
}
