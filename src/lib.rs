//! # Threadline
//!
//! Keep ticket notification emails in one thread per ticket.
//!
//! Mail clients thread a conversation through the `In-Reply-To` and
//! `References` headers, which must name the `Message-ID` of an earlier
//! message. A ticket tracker usually derives that id from the ticket number
//! and assumes it knows what the first notification was called. That breaks
//! when:
//!
//! - the relay rewrites Message-IDs in transit (Amazon SES does), or
//! - the sender domain or project URL changes, so recomputed ids differ.
//!
//! Threadline records the Message-ID each ticket's first notification was
//! actually delivered with, and stamps it on every follow-up.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use threadline::{ComponentRegistry, Environment, MessageIdSender};
//!
//! let env = Arc::new(Environment::open("/srv/tickets/main")?);
//! let component = Arc::new(MessageIdSender::from_environment(env));
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register_component("messageid", component);
//! if registry.needs_upgrade()? {
//!     registry.upgrade()?;
//! }
//!
//! // Follow-up notification: reply to the stored id
//! registry.decorate(&NotificationEvent::ticket("changed", 42), &mut message, "utf-8")?;
//!
//! // Any notification: deliver and remember the id for ticket 42
//! registry.sender("messageid").unwrap().send(from, &recipients, &raw)?;
//! ```
//!
//! ## Backfill
//!
//! Existing trackers can populate the table with the `fill-messageid` tool:
//!
//! ```bash
//! fill-messageid --verbose /srv/tickets/main /srv/tickets/other
//! fill-messageid --dry-run /srv/tickets/main
//! ```
//!
//! ## Feature Flags
//!
//! - `smtp` - SMTP relay via lettre (default)
//! - `cli` - the `fill-messageid` binary (default)

/// The version of the threadline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod config;
mod env;
mod error;
mod hooks;
mod message;
mod registry;
mod relay;

pub mod fill;
pub mod msgid;
pub mod providers;
pub mod resolver;
pub mod schema;
pub mod store;

// Re-exports
pub use config::{Config, NotificationConfig, ProjectConfig};
pub use env::Environment;
pub use error::{Error, RecipientRefusal};
pub use hooks::{
    EmailDecorator, EmailSender, EnvironmentSetupParticipant, MessageIdSender,
    NotificationEvent, SendReport, StoreOutcome,
};
pub use message::{fix_eol, OutboundMessage, OutgoingMessage, TICKET_ID_HEADER};
pub use registry::ComponentRegistry;
pub use relay::{Relay, RelayResponse};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::ComponentRegistry;
    pub use crate::EmailDecorator;
    pub use crate::EmailSender;
    pub use crate::Environment;
    pub use crate::EnvironmentSetupParticipant;
    pub use crate::Error;
    pub use crate::MessageIdSender;
    pub use crate::NotificationEvent;
    pub use crate::OutboundMessage;
    pub use crate::OutgoingMessage;
    pub use crate::Relay;
}
