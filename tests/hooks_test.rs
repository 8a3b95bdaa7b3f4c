//! Tests for the send and decorate hooks.

use std::sync::Arc;

use threadline::providers::LocalRelay;
use threadline::{
    store, ComponentRegistry, Config, EmailDecorator, EmailSender, Environment,
    EnvironmentSetupParticipant, Error, MessageIdSender, NotificationEvent, OutboundMessage,
    OutgoingMessage, StoreOutcome,
};

// ============================================================================
// Helper Functions
// ============================================================================

const SES_HOST: &str = "email-smtp.us-east-1.amazonaws.com";

fn sender(relay: LocalRelay) -> MessageIdSender<LocalRelay> {
    let env = Arc::new(Environment::in_memory(Config::default()).unwrap());
    let sender = MessageIdSender::new(env, relay);
    sender.environment_created().unwrap();
    sender
}

fn raw_notification(ticket_id: i64, message_id: &str) -> String {
    format!(
        "From: tickets@example.com\n\
         To: dev@example.com\n\
         Subject: #{ticket_id}: Build fails on ARM\n\
         Message-ID: {message_id}\n\
         X-Trac-Ticket-ID: {ticket_id}\n\
         \n\
         Ticket body\n"
    )
}

fn recipients() -> Vec<String> {
    vec!["dev@example.com".to_string()]
}

fn stored(sender: &MessageIdSender<LocalRelay>, ticket_id: i64) -> Option<String> {
    sender
        .environment()
        .db_query(|conn| store::get(conn, ticket_id))
        .unwrap()
}

// ============================================================================
// Send Hook
// ============================================================================

#[test]
fn send_stores_message_id_of_first_notification() {
    let relay = LocalRelay::new("mail.example.com");
    let sender = sender(relay.clone());

    sender
        .send(
            "tickets@example.com",
            &recipients(),
            &raw_notification(7, "<039.aaa@example.com>"),
        )
        .unwrap();

    assert_eq!(relay.sent_count(), 1);
    assert_eq!(stored(&sender, 7).as_deref(), Some("<039.aaa@example.com>"));
}

#[test]
fn send_keeps_first_message_id() {
    let sender = sender(LocalRelay::new("mail.example.com"));

    sender
        .send("tickets@example.com", &recipients(), &raw_notification(7, "<first@x>"))
        .unwrap();
    sender
        .send("tickets@example.com", &recipients(), &raw_notification(7, "<second@x>"))
        .unwrap();

    assert_eq!(stored(&sender, 7).as_deref(), Some("<first@x>"));
}

#[test]
fn send_through_ses_stores_ses_message_id() {
    let relay = LocalRelay::new(SES_HOST).respond_with("Ok 0100017f2a9e-abc123");
    let sender = sender(relay);

    let message = OutboundMessage::new("tickets@example.com", recipients(), "Subject: x\n\nbody")
        .ticket_id(12)
        .message_id("<own@example.com>");
    let report = sender.deliver(&message).unwrap();

    assert_eq!(
        report.message_id.as_deref(),
        Some("<0100017f2a9e-abc123@us-east-1.amazonses.com>")
    );
    assert_eq!(report.stored, StoreOutcome::Inserted);
    assert_eq!(
        stored(&sender, 12).as_deref(),
        Some("<0100017f2a9e-abc123@us-east-1.amazonses.com>")
    );
}

#[test]
fn send_through_ses_with_unexpected_reply_keeps_own_id() {
    let relay = LocalRelay::new(SES_HOST).respond_with("2.0.0 queued");
    let sender = sender(relay);

    let message = OutboundMessage::new("tickets@example.com", recipients(), "")
        .ticket_id(3)
        .message_id("<own@example.com>");
    sender.deliver(&message).unwrap();

    assert_eq!(stored(&sender, 3).as_deref(), Some("<own@example.com>"));
}

#[test]
fn refused_delivery_stores_nothing() {
    let relay = LocalRelay::new("mail.example.com");
    relay.refuse_recipient("dev@example.com");
    let sender = sender(relay.clone());

    let result = sender.send(
        "tickets@example.com",
        &recipients(),
        &raw_notification(9, "<x@y>"),
    );

    assert!(matches!(result, Err(Error::RecipientsRefused(_))));
    assert_eq!(relay.sent_count(), 0);
    assert_eq!(stored(&sender, 9), None);
}

#[test]
fn partial_refusal_still_stores() {
    let relay = LocalRelay::new("mail.example.com");
    relay.refuse_recipient("gone@example.com");
    let sender = sender(relay.clone());

    let recipients = vec!["gone@example.com".to_string(), "dev@example.com".to_string()];
    sender
        .send("tickets@example.com", &recipients, &raw_notification(4, "<p@x>"))
        .unwrap();

    assert_eq!(relay.last_sent().unwrap().recipients, vec!["dev@example.com"]);
    assert_eq!(stored(&sender, 4).as_deref(), Some("<p@x>"));
}

#[test]
fn store_failure_after_delivery_is_reported_not_raised() {
    let relay = LocalRelay::new("mail.example.com");
    let env = Arc::new(Environment::in_memory(Config::default()).unwrap());
    // No setup: the messageid table does not exist.
    let sender = MessageIdSender::new(env, relay.clone());

    let message = OutboundMessage::new("tickets@example.com", recipients(), "")
        .ticket_id(5)
        .message_id("<m@x>");
    let report = sender.deliver(&message).unwrap();

    assert!(matches!(report.stored, StoreOutcome::Failed(_)));
    assert_eq!(relay.sent_count(), 1);
}

#[test]
fn notification_without_ticket_is_delivered_and_skipped() {
    let relay = LocalRelay::new("mail.example.com");
    let sender = sender(relay.clone());

    let message = OutboundMessage::parse(
        "tickets@example.com",
        recipients(),
        "Message-ID: <wiki@x>\nSubject: Wiki page changed\n\nbody",
    )
    .unwrap();
    let report = sender.deliver(&message).unwrap();

    assert_eq!(report.stored, StoreOutcome::Skipped);
    assert_eq!(relay.sent_count(), 1);
}

#[test]
fn delivered_message_uses_crlf() {
    let relay = LocalRelay::new("mail.example.com");
    let sender = sender(relay.clone());

    sender
        .send("tickets@example.com", &recipients(), &raw_notification(1, "<c@x>"))
        .unwrap();

    let raw = relay.last_sent().unwrap().raw;
    assert!(raw.contains("Subject: #1: Build fails on ARM\r\n"));
    assert!(!raw.replace("\r\n", "").contains('\n'));
}

// ============================================================================
// Decorate Hook
// ============================================================================

#[test]
fn decorate_followup_sets_reply_headers() {
    let sender = sender(LocalRelay::new("mail.example.com"));
    sender
        .environment()
        .db_transaction(|tx| store::insert_if_absent(tx, 21, "<root@x>"))
        .unwrap();

    let mut message = OutgoingMessage::new();
    sender
        .decorate_message(&NotificationEvent::ticket("changed", 21), &mut message, "utf-8")
        .unwrap();

    assert_eq!(message.header("In-Reply-To"), Some("<root@x>"));
    assert_eq!(message.header("References"), Some("<root@x>"));
}

#[test]
fn decorate_without_stored_id_sets_nothing() {
    let sender = sender(LocalRelay::new("mail.example.com"));

    let mut message = OutgoingMessage::new();
    sender
        .decorate_message(&NotificationEvent::ticket("changed", 99), &mut message, "utf-8")
        .unwrap();

    assert_eq!(message.header("In-Reply-To"), None);
    assert_eq!(message.header("References"), None);
}

#[test]
fn decorate_ignores_creation_and_other_realms() {
    let sender = sender(LocalRelay::new("mail.example.com"));
    sender
        .environment()
        .db_transaction(|tx| store::insert_if_absent(tx, 1, "<root@x>"))
        .unwrap();

    let mut created = OutgoingMessage::new();
    sender
        .decorate_message(&NotificationEvent::ticket("created", 1), &mut created, "utf-8")
        .unwrap();
    assert!(created.headers().is_empty());

    let mut wiki = OutgoingMessage::new();
    sender
        .decorate_message(&NotificationEvent::new("wiki", "changed", 1), &mut wiki, "utf-8")
        .unwrap();
    assert!(wiki.headers().is_empty());
}

#[test]
fn send_then_decorate_threads_followup() {
    let relay = LocalRelay::new(SES_HOST).respond_with("Ok 0100abc");
    let sender = sender(relay);

    sender
        .send("tickets@example.com", &recipients(), &raw_notification(30, "<own@x>"))
        .unwrap();

    let mut followup = OutgoingMessage::new();
    sender
        .decorate_message(&NotificationEvent::ticket("changed", 30), &mut followup, "utf-8")
        .unwrap();
    assert_eq!(
        followup.header("In-Reply-To"),
        Some("<0100abc@us-east-1.amazonses.com>")
    );
}

// ============================================================================
// Setup and Registry
// ============================================================================

#[test]
fn setup_participant_lifecycle() {
    let env = Arc::new(Environment::in_memory(Config::default()).unwrap());
    let sender = MessageIdSender::new(env, LocalRelay::new("localhost"));

    assert!(sender.environment_needs_upgrade().unwrap());
    sender.upgrade_environment().unwrap();
    assert!(!sender.environment_needs_upgrade().unwrap());
}

#[test]
fn registry_dispatches_by_capability() {
    let relay = LocalRelay::new("mail.example.com");
    let env = Arc::new(Environment::in_memory(Config::default()).unwrap());
    let component = Arc::new(MessageIdSender::new(env, relay.clone()));

    let mut registry = ComponentRegistry::new();
    registry.register_component("messageid", component);

    assert!(registry.needs_upgrade().unwrap());
    assert_eq!(registry.upgrade().unwrap(), vec!["messageid".to_string()]);
    assert!(!registry.needs_upgrade().unwrap());

    let sender = registry.sender("messageid").unwrap();
    sender
        .send("tickets@example.com", &recipients(), &raw_notification(2, "<r@x>"))
        .unwrap();
    assert!(registry.sender("missing").is_none());

    let mut followup = OutgoingMessage::new();
    registry
        .decorate(&NotificationEvent::ticket("changed", 2), &mut followup, "utf-8")
        .unwrap();
    assert_eq!(followup.header("References"), Some("<r@x>"));
    assert_eq!(relay.sent_count(), 1);
}
