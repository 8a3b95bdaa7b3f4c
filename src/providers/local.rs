//! Local relay for development and testing.
//!
//! Captures messages in memory instead of delivering them, and can be told to
//! refuse recipients or fail outright to exercise error paths.
//!
//! # Testing Usage
//!
//! ```rust,ignore
//! use threadline::providers::LocalRelay;
//!
//! let relay = LocalRelay::new("email-smtp.us-east-1.amazonaws.com")
//!     .respond_with("Ok 0100017f-abc");
//!
//! // Code under test
//! sender.deliver(&message)?;
//!
//! assert_eq!(relay.sent_count(), 1);
//! ```

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, RecipientRefusal};
use crate::message::OutboundMessage;
use crate::relay::{Relay, RelayResponse};

#[derive(Debug, Default)]
struct State {
    sent: Vec<OutboundMessage>,
    refused: HashSet<String>,
    fail_with: Option<Error>,
}

/// Relay that keeps messages in memory.
///
/// Clones share the captured messages.
#[derive(Debug, Clone)]
pub struct LocalRelay {
    hostname: String,
    response: String,
    state: Arc<RwLock<State>>,
}

impl LocalRelay {
    /// Create a relay posing as `hostname`.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            response: "Ok".to_string(),
            state: Arc::default(),
        }
    }

    /// Reply text returned after a successful send.
    pub fn respond_with(mut self, text: impl Into<String>) -> Self {
        self.response = text.into();
        self
    }

    // =========================================================================
    // Failure Simulation (for testing)
    // =========================================================================

    /// Refuse `address` at `RCPT TO`.
    pub fn refuse_recipient(&self, address: impl Into<String>) {
        self.state.write().refused.insert(address.into());
    }

    /// Fail every send with `error`.
    pub fn set_failure(&self, error: Error) {
        self.state.write().fail_with = Some(error);
    }

    /// Clear the failure state.
    pub fn clear_failure(&self) {
        self.state.write().fail_with = None;
    }

    // =========================================================================
    // Message Access (for testing assertions)
    // =========================================================================

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.read().sent.clone()
    }

    /// Number of messages delivered.
    pub fn sent_count(&self) -> usize {
        self.state.read().sent.len()
    }

    /// Most recently delivered message.
    pub fn last_sent(&self) -> Option<OutboundMessage> {
        self.state.read().sent.last().cloned()
    }

    /// Forget captured messages.
    pub fn clear(&self) {
        self.state.write().sent.clear();
    }
}

impl Relay for LocalRelay {
    fn send(&self, message: &OutboundMessage) -> Result<RelayResponse, Error> {
        let mut state = self.state.write();
        if let Some(err) = &state.fail_with {
            return Err(err.clone());
        }

        let (accepted, refused): (Vec<String>, Vec<String>) = message
            .recipients
            .iter()
            .cloned()
            .partition(|r| !state.refused.contains(r));

        if accepted.is_empty() {
            return Err(Error::RecipientsRefused(
                refused
                    .into_iter()
                    .map(|address| RecipientRefusal {
                        address,
                        code: Some("550".to_string()),
                        message: "mailbox unavailable".to_string(),
                    })
                    .collect(),
            ));
        }

        let mut delivered = message.clone();
        delivered.raw = message.wire_format();
        delivered.recipients = accepted.clone();
        state.sent.push(delivered);

        tracing::debug!(
            hostname = %self.hostname,
            recipients = ?accepted,
            "Captured notification"
        );
        Ok(RelayResponse::new("250", self.response.clone()).accepted(accepted))
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn relay_name(&self) -> &'static str {
        "local"
    }
}
