//! Relay trait and delivery response types.
//!
//! A [`Relay`] hands one composed message to a mail server and reports the
//! server's final reply. The reply text matters: some relays (Amazon SES)
//! put the Message-ID they actually used in it, see [`crate::resolver`].
//!
//! Delivery is blocking. Notifications are sent from inside the request that
//! triggered them, and the caller waits for the relay to accept the message.

use crate::error::Error;
use crate::message::OutboundMessage;

/// The relay's reply to the end of `DATA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    /// Reply code, e.g. `250`.
    pub code: String,
    /// Reply text without the code, lines joined with `\n`.
    pub text: String,
    /// Recipients the relay accepted.
    pub accepted: Vec<String>,
}

impl RelayResponse {
    pub fn new(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            text: text.into(),
            accepted: Vec::new(),
        }
    }

    /// Set the accepted recipients.
    pub fn accepted(mut self, accepted: Vec<String>) -> Self {
        self.accepted = accepted;
        self
    }
}

/// A mail relay.
///
/// Implemented by [`SmtpRelay`](crate::providers::SmtpRelay) for real delivery
/// and [`LocalRelay`](crate::providers::LocalRelay) for development and tests.
pub trait Relay: Send + Sync {
    /// Deliver `message` and return the relay's final reply.
    fn send(&self, message: &OutboundMessage) -> Result<RelayResponse, Error>;

    /// Hostname of the relay, used to recognise relays that rewrite Message-IDs.
    fn hostname(&self) -> &str;

    /// Get the relay name (for logging/debugging).
    fn relay_name(&self) -> &'static str {
        "unknown"
    }
}

impl<R: Relay + ?Sized> Relay for std::sync::Arc<R> {
    fn send(&self, message: &OutboundMessage) -> Result<RelayResponse, Error> {
        (**self).send(message)
    }

    fn hostname(&self) -> &str {
        (**self).hostname()
    }

    fn relay_name(&self) -> &'static str {
        (**self).relay_name()
    }
}
