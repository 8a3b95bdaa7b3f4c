//! Notification hooks.
//!
//! The tracker's notification pipeline calls out at two points:
//!
//! - [`EmailSender::send`] hands over a fully composed message for delivery;
//! - [`EmailDecorator::decorate_message`] lets plugins stamp headers on a
//!   message that is still being built.
//!
//! [`MessageIdSender`] implements both. On send it delivers through a
//! [`Relay`], works out the Message-ID recipients will see and remembers it for
//! the ticket. On decorate it makes follow-up notifications reply to that id,
//! so mail clients keep the whole ticket in one thread.
//!
//! It also implements [`EnvironmentSetupParticipant`] to create and upgrade
//! its table.

use std::sync::Arc;

use crate::env::Environment;
use crate::error::Error;
use crate::message::{OutboundMessage, OutgoingMessage};
use crate::relay::Relay;
use crate::{resolver, schema, store};

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Resource realm, e.g. `ticket`.
    pub realm: String,
    /// Change category, e.g. `created` or `changed`.
    pub category: String,
    /// Id of the resource.
    pub target_id: i64,
}

impl NotificationEvent {
    pub fn new(realm: impl Into<String>, category: impl Into<String>, target_id: i64) -> Self {
        Self {
            realm: realm.into(),
            category: category.into(),
            target_id,
        }
    }

    /// Event for a ticket.
    pub fn ticket(category: impl Into<String>, ticket_id: i64) -> Self {
        Self::new("ticket", category, ticket_id)
    }

    /// True for changes to an existing ticket (anything but its creation).
    pub fn is_ticket_followup(&self) -> bool {
        self.realm == "ticket" && self.category != "created"
    }
}

/// Delivers composed notifications.
pub trait EmailSender: Send + Sync {
    /// Send `message` from `from` to `recipients`.
    fn send(&self, from: &str, recipients: &[String], message: &str) -> Result<(), Error>;
}

/// Adjusts notifications before they are finalized.
pub trait EmailDecorator: Send + Sync {
    fn decorate_message(
        &self,
        event: &NotificationEvent,
        message: &mut OutgoingMessage,
        charset: &str,
    ) -> Result<(), Error>;
}

/// Takes part in environment creation and upgrades.
pub trait EnvironmentSetupParticipant: Send + Sync {
    /// Called once when a new environment is created.
    fn environment_created(&self) -> Result<(), Error>;

    /// Whether [`upgrade_environment`](Self::upgrade_environment) must run
    /// before the environment is usable.
    fn environment_needs_upgrade(&self) -> Result<bool, Error>;

    /// Perform the upgrade.
    fn upgrade_environment(&self) -> Result<(), Error>;
}

/// Result of storing a delivered notification's Message-ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// First notification for the ticket; its id was stored.
    Inserted,
    /// The ticket already had an id, which was kept.
    AlreadyPresent,
    /// Nothing to store (no ticket or no Message-ID).
    Skipped,
    /// The message was delivered but the id could not be stored.
    Failed(String),
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub ticket_id: Option<i64>,
    /// Message-ID as recipients see it.
    pub message_id: Option<String>,
    pub stored: StoreOutcome,
}

/// Sends notifications and threads follow-ups to the first one.
pub struct MessageIdSender<R> {
    env: Arc<Environment>,
    relay: R,
}

impl<R> std::fmt::Debug for MessageIdSender<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageIdSender")
            .field("env", &self.env.path())
            .finish_non_exhaustive()
    }
}

impl<R: Relay> MessageIdSender<R> {
    pub fn new(env: Arc<Environment>, relay: R) -> Self {
        Self { env, relay }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Deliver `message` and remember its Message-ID for its ticket.
    ///
    /// Delivery errors are returned. Once the relay accepted the message,
    /// failing to store the id is logged and reported in
    /// [`SendReport::stored`] but is not an error.
    pub fn deliver(&self, message: &OutboundMessage) -> Result<SendReport, Error> {
        let response = self.relay.send(message)?;

        let own_id = message.message_id.as_deref().unwrap_or_default();
        let resolved = resolver::resolve(self.relay.hostname(), own_id, &response.text);
        let message_id = Some(resolved).filter(|id| !id.is_empty());

        let stored = match (message.ticket_id, &message_id) {
            (Some(ticket_id), Some(id)) => self.store(ticket_id, id),
            _ => {
                tracing::debug!(
                    ticket_id = ?message.ticket_id,
                    "No ticket or Message-ID on notification, nothing to store"
                );
                StoreOutcome::Skipped
            }
        };

        Ok(SendReport {
            ticket_id: message.ticket_id,
            message_id,
            stored,
        })
    }

    fn store(&self, ticket_id: i64, message_id: &str) -> StoreOutcome {
        let result = self
            .env
            .db_transaction(|tx| store::insert_if_absent(tx, ticket_id, message_id));
        match result {
            Ok(true) => {
                tracing::debug!(ticket_id, message_id, "Stored Message-ID");
                StoreOutcome::Inserted
            }
            Ok(false) => {
                tracing::debug!(ticket_id, "Ticket already has a Message-ID");
                StoreOutcome::AlreadyPresent
            }
            Err(e) => {
                tracing::error!(
                    ticket_id,
                    message_id,
                    error = %e,
                    "Notification delivered but its Message-ID could not be stored"
                );
                StoreOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(feature = "smtp")]
impl MessageIdSender<crate::providers::SmtpRelay> {
    /// Sender delivering through the relay configured for `env`.
    pub fn from_environment(env: Arc<Environment>) -> Self {
        let relay = crate::providers::SmtpRelay::from_config(&env.config().notification);
        Self::new(env, relay)
    }
}

impl<R: Relay> EmailSender for MessageIdSender<R> {
    fn send(&self, from: &str, recipients: &[String], message: &str) -> Result<(), Error> {
        let outbound = OutboundMessage::parse(from, recipients.to_vec(), message)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not read notification headers");
                OutboundMessage::new(from, recipients.to_vec(), message)
            });
        self.deliver(&outbound).map(|_| ())
    }
}

impl<R: Relay> EmailDecorator for MessageIdSender<R> {
    fn decorate_message(
        &self,
        event: &NotificationEvent,
        message: &mut OutgoingMessage,
        charset: &str,
    ) -> Result<(), Error> {
        if !event.is_ticket_followup() {
            return Ok(());
        }
        let stored = self
            .env
            .db_query(|conn| store::get(conn, event.target_id))?;
        if let Some(message_id) = stored {
            message.set_header("In-Reply-To", &message_id, charset);
            message.set_header("References", &message_id, charset);
        }
        Ok(())
    }
}

impl<R: Relay> EnvironmentSetupParticipant for MessageIdSender<R> {
    fn environment_created(&self) -> Result<(), Error> {
        self.env
            .db_transaction(|tx| schema::create_initial_schema(tx))
    }

    fn environment_needs_upgrade(&self) -> Result<bool, Error> {
        self.env.db_query(|conn| {
            schema::needs_upgrade(conn, schema::SCHEMA_VERSION, schema::SCHEMA_NAME)
        })
    }

    fn upgrade_environment(&self) -> Result<(), Error> {
        self.env.db_transaction(|tx| schema::upgrade(tx))
    }
}
