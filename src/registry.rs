//! Capability registry.
//!
//! The tracker looks plugins up by the interfaces they provide rather than by
//! concrete type. Components register under a name for each capability they
//! implement; the tracker then drives every decorator or setup participant in
//! registration order, and picks one sender by name.
//!
//! ```rust,ignore
//! let component = Arc::new(MessageIdSender::from_environment(env));
//! let mut registry = ComponentRegistry::new();
//! registry.register_component("messageid", component);
//!
//! if registry.needs_upgrade()? {
//!     registry.upgrade()?;
//! }
//! registry.sender("messageid").unwrap().send(from, &recipients, &raw)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::hooks::{EmailDecorator, EmailSender, EnvironmentSetupParticipant, NotificationEvent};
use crate::message::OutgoingMessage;

/// Lookup table from capability to registered components.
#[derive(Default)]
pub struct ComponentRegistry {
    senders: BTreeMap<String, Arc<dyn EmailSender>>,
    decorators: Vec<(String, Arc<dyn EmailDecorator>)>,
    setup_participants: Vec<(String, Arc<dyn EnvironmentSetupParticipant>)>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("senders", &self.senders.keys().collect::<Vec<_>>())
            .field(
                "decorators",
                &self.decorators.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field(
                "setup_participants",
                &self.setup_participants.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an email sender. A later sender with the same name replaces
    /// the earlier one.
    pub fn register_sender(&mut self, name: impl Into<String>, sender: Arc<dyn EmailSender>) {
        self.senders.insert(name.into(), sender);
    }

    pub fn register_decorator(
        &mut self,
        name: impl Into<String>,
        decorator: Arc<dyn EmailDecorator>,
    ) {
        self.decorators.push((name.into(), decorator));
    }

    pub fn register_setup_participant(
        &mut self,
        name: impl Into<String>,
        participant: Arc<dyn EnvironmentSetupParticipant>,
    ) {
        self.setup_participants.push((name.into(), participant));
    }

    /// Register a component under every capability it implements.
    pub fn register_component<C>(&mut self, name: &str, component: Arc<C>)
    where
        C: EmailSender + EmailDecorator + EnvironmentSetupParticipant + 'static,
    {
        self.register_sender(name, component.clone());
        self.register_decorator(name, component.clone());
        self.register_setup_participant(name, component);
    }

    /// Sender registered as `name`.
    pub fn sender(&self, name: &str) -> Option<Arc<dyn EmailSender>> {
        self.senders.get(name).cloned()
    }

    /// Names of registered senders.
    pub fn sender_names(&self) -> impl Iterator<Item = &str> {
        self.senders.keys().map(String::as_str)
    }

    /// Run every decorator on `message`.
    pub fn decorate(
        &self,
        event: &NotificationEvent,
        message: &mut OutgoingMessage,
        charset: &str,
    ) -> Result<(), Error> {
        for (_, decorator) in &self.decorators {
            decorator.decorate_message(event, message, charset)?;
        }
        Ok(())
    }

    /// Notify every setup participant that the environment was just created.
    pub fn environment_created(&self) -> Result<(), Error> {
        for (name, participant) in &self.setup_participants {
            tracing::debug!(component = %name, "Initializing new environment");
            participant.environment_created()?;
        }
        Ok(())
    }

    /// Whether any participant needs an upgrade.
    pub fn needs_upgrade(&self) -> Result<bool, Error> {
        for (_, participant) in &self.setup_participants {
            if participant.environment_needs_upgrade()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Upgrade every participant that needs it. Returns the names upgraded.
    pub fn upgrade(&self) -> Result<Vec<String>, Error> {
        let mut upgraded = Vec::new();
        for (name, participant) in &self.setup_participants {
            if participant.environment_needs_upgrade()? {
                tracing::info!(component = %name, "Upgrading environment");
                participant.upgrade_environment()?;
                upgraded.push(name.clone());
            }
        }
        Ok(upgraded)
    }
}
