//! Error types for threadline.

use std::fmt;

use thiserror::Error;

/// A recipient the relay refused during `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRefusal {
    /// The refused address.
    pub address: String,
    /// SMTP reply code, if the server sent one.
    pub code: Option<String>,
    /// Server reply text.
    pub message: String,
}

impl fmt::Display for RecipientRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({} {})", self.address, code, self.message),
            None => write!(f, "{} ({})", self.address, self.message),
        }
    }
}

/// Errors raised while delivering notifications or maintaining the message-id table.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Configuration error (unreachable relay, bad config file, invalid value, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// TLS was requested but the relay does not advertise STARTTLS.
    #[error("TLS enabled but server does not support TLS")]
    TlsUnsupported,

    /// The relay rejected the envelope sender.
    #[error("Sender refused: {address} ({code} {message})")]
    SenderRefused {
        address: String,
        code: String,
        message: String,
    },

    /// The relay rejected every recipient.
    #[error("Recipients refused: {}", format_refusals(.0))]
    RecipientsRefused(Vec<RecipientRefusal>),

    /// The relay rejected the message content.
    #[error("Data rejected: {code} {message}")]
    DataRejected { code: String, message: String },

    /// Any other SMTP failure (authentication, broken session, ...).
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// The stored schema version is newer than this build understands.
    #[error(
        "Schema version of {name} is {stored}, but this build supports only version {expected}; \
         downgrading is not supported"
    )]
    SchemaDowngrade {
        name: String,
        stored: i64,
        expected: i64,
    },

    /// Database failure.
    #[error("Database error: {0}")]
    Database(String),

    /// The composed message could not be parsed.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),
}

fn format_refusals(refusals: &[RecipientRefusal]) -> String {
    refusals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Create the error raised when the relay cannot be reached.
    pub fn relay_unreachable(reason: impl fmt::Display) -> Self {
        Self::Configuration(format!(
            "SMTP server connection error ({reason}). Please modify \
             [notification] smtp_server or [notification] smtp_port in your configuration."
        ))
    }

    /// True for errors the operator fixes by editing configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::TlsUnsupported)
    }

    /// True for errors the relay raised during the mail transaction.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::SenderRefused { .. } | Self::RecipientsRefused(_) | Self::DataRejected { .. }
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<mailparse::MailParseError> for Error {
    fn from(err: mailparse::MailParseError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::transport::smtp::Error> for Error {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::Smtp(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for Error {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::Configuration(format!("invalid email address: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_unreachable_names_both_options() {
        let err = Error::relay_unreachable("Connection refused");
        let text = err.to_string();
        assert!(text.contains("[notification] smtp_server"));
        assert!(text.contains("[notification] smtp_port"));
        assert!(text.contains("Connection refused"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_recipients_refused_lists_each_address() {
        let err = Error::RecipientsRefused(vec![
            RecipientRefusal {
                address: "a@example.com".into(),
                code: Some("550".into()),
                message: "no such user".into(),
            },
            RecipientRefusal {
                address: "b@example.com".into(),
                code: None,
                message: "invalid address".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("a@example.com (550 no such user)"));
        assert!(text.contains("b@example.com (invalid address)"));
        assert!(err.is_protocol());
        assert!(!err.is_configuration());
    }
}
