//! SMTP relay using lettre's low-level connection.
//!
//! The high-level lettre transports stop at the first refused recipient and
//! hide the final `DATA` reply. This relay drives the session by hand so that
//! it can deliver to the accepted subset of recipients and hand the reply
//! text back to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use threadline::providers::SmtpRelay;
//!
//! // Amazon SES with STARTTLS and authentication
//! let relay = SmtpRelay::new("email-smtp.eu-west-1.amazonaws.com", 587)
//!     .credentials("AKIA...", "secret")
//!     .starttls(true);
//!
//! // Local relay, no TLS, no auth
//! let relay = SmtpRelay::localhost();
//! ```

use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Ehlo, Mail, Rcpt, Rset};
use lettre::transport::smtp::extension::{ClientId, MailParameter};
use lettre::transport::smtp::response::Response;
use lettre::Address;
use std::time::{Duration, Instant};

use crate::config::NotificationConfig;
use crate::error::{Error, RecipientRefusal};
use crate::message::OutboundMessage;
use crate::relay::{Relay, RelayResponse};

/// Submissions slower than this are logged as a warning.
const SLOW_SUBMISSION: Duration = Duration::from_secs(5);

/// SMTP relay.
#[derive(Clone)]
pub struct SmtpRelay {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    use_tls: bool,
    hello_name: String,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for SmtpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpRelay")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("authenticated", &self.credentials.is_some())
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

impl SmtpRelay {
    /// Create a relay for `host:port` without TLS or authentication.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            use_tls: false,
            hello_name: "localhost".to_string(),
            timeout: None,
        }
    }

    /// Relay on `localhost:25`.
    pub fn localhost() -> Self {
        Self::new("localhost", 25)
    }

    /// Create a relay from the `[notification]` settings.
    pub fn from_config(config: &NotificationConfig) -> Self {
        let relay = Self::new(&config.smtp_server, config.smtp_port).starttls(config.use_tls);
        match config.credentials() {
            Some((user, password)) => relay.credentials(user, password),
            None => relay,
        }
    }

    /// Authenticate with these credentials.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(
            username.to_string(),
            password.to_string(),
        ));
        self
    }

    /// Require STARTTLS before authenticating and sending.
    pub fn starttls(mut self, enabled: bool) -> Self {
        self.use_tls = enabled;
        self
    }

    /// Name announced in `EHLO`.
    pub fn hello_name(mut self, name: impl Into<String>) -> Self {
        self.hello_name = name.into();
        self
    }

    /// Socket timeout. `None` (the default) blocks until the relay answers.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Open an authenticated session. The flag tells whether the server
    /// advertised the `SIZE` extension.
    fn open(&self, hello: &ClientId) -> Result<(SmtpConnection, bool), Error> {
        let mut conn = SmtpConnection::connect(
            (self.host.as_str(), self.port),
            self.timeout,
            hello,
            None,
            None,
        )
        .map_err(Error::relay_unreachable)?;

        if self.use_tls {
            if !conn.can_starttls() {
                conn.abort();
                return Err(Error::TlsUnsupported);
            }
            let tls = TlsParameters::new(self.host.clone())?;
            conn.starttls(&tls, hello)?;
        }

        let supports_size = advertises_size(&mut conn, hello);

        if let Some(credentials) = &self.credentials {
            if let Err(e) = conn.auth(&[Mechanism::Plain, Mechanism::Login], credentials) {
                conn.abort();
                return Err(e.into());
            }
        }

        Ok((conn, supports_size))
    }

    fn close(&self, conn: &mut SmtpConnection) -> Result<(), Error> {
        match conn.quit() {
            Ok(_) => Ok(()),
            // The server may tear down the TLS session before answering QUIT.
            Err(e) if self.use_tls && !(e.is_transient() || e.is_permanent()) => {
                tracing::debug!(error = %e, "Ignoring TLS teardown error on QUIT");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Relay for SmtpRelay {
    fn send(&self, message: &OutboundMessage) -> Result<RelayResponse, Error> {
        let wire = message.wire_format();

        tracing::info!(
            host = %self.host,
            port = self.port,
            recipients = ?message.recipients,
            "Sending notification through SMTP"
        );

        let hello = ClientId::Domain(self.hello_name.clone());
        let (mut conn, supports_size) = self.open(&hello)?;

        let mut parameters = Vec::new();
        if supports_size {
            parameters.push(MailParameter::Size(wire.len()));
        }

        let start = Instant::now();
        let result = sendmail(
            &mut conn,
            &message.from,
            &message.recipients,
            parameters,
            wire.as_bytes(),
        );
        let elapsed = start.elapsed();
        if elapsed > SLOW_SUBMISSION {
            tracing::warn!(
                seconds = %format!("{:.2}", elapsed.as_secs_f64()),
                "Slow mail submission, check your mail setup"
            );
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                conn.abort();
                return Err(e);
            }
        };

        self.close(&mut conn)?;
        Ok(response)
    }

    fn hostname(&self) -> &str {
        &self.host
    }

    fn relay_name(&self) -> &'static str {
        "smtp"
    }
}

/// Run one mail transaction on an open session.
///
/// Recipients the server refuses are skipped; the transaction is aborted only
/// if the sender or every recipient is refused, or the content is rejected.
fn sendmail(
    conn: &mut SmtpConnection,
    from: &str,
    recipients: &[String],
    parameters: Vec<MailParameter>,
    message: &[u8],
) -> Result<RelayResponse, Error> {
    let sender: Address = from.parse().map_err(|e| {
        Error::Configuration(format!("invalid sender address {from:?}: {e}"))
    })?;

    if let Err(e) = conn.command(Mail::new(Some(sender), parameters)) {
        reset(conn);
        return Err(Error::SenderRefused {
            address: from.to_string(),
            code: status_code(&e),
            message: e.to_string(),
        });
    }

    let mut accepted = Vec::with_capacity(recipients.len());
    let mut refused = Vec::new();
    for recipient in recipients {
        let address: Address = match recipient.parse() {
            Ok(address) => address,
            Err(e) => {
                refused.push(RecipientRefusal {
                    address: recipient.clone(),
                    code: None,
                    message: format!("invalid address: {e}"),
                });
                continue;
            }
        };
        match conn.command(Rcpt::new(address, vec![])) {
            Ok(_) => accepted.push(recipient.clone()),
            Err(e) => refused.push(RecipientRefusal {
                address: recipient.clone(),
                code: e.status().map(|c| c.to_string()),
                message: e.to_string(),
            }),
        }
    }

    if accepted.is_empty() {
        reset(conn);
        return Err(Error::RecipientsRefused(refused));
    }
    if !refused.is_empty() {
        tracing::warn!(
            refused = %refused.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            "Relay refused some recipients, delivering to the rest"
        );
    }

    if let Err(e) = conn.command(Data) {
        reset(conn);
        return Err(data_rejected(&e));
    }
    // lettre appends the terminating CRLF.CRLF itself.
    let body = message.strip_suffix(b"\r\n").unwrap_or(message);
    let response = match conn.message(body) {
        Ok(response) => response,
        Err(e) => {
            reset(conn);
            return Err(data_rejected(&e));
        }
    };

    Ok(RelayResponse::new(response.code().to_string(), response_text(&response)).accepted(accepted))
}

/// Whether the `EHLO` reply lists `SIZE`.
///
/// lettre's parsed server info drops extensions it does not use itself, so
/// the reply is read directly.
fn advertises_size(conn: &mut SmtpConnection, hello: &ClientId) -> bool {
    match conn.command(Ehlo::new(hello.clone())) {
        Ok(response) => response.message().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case("SIZE"))
        }),
        Err(e) => {
            tracing::debug!(error = %e, "EHLO failed, not sending SIZE");
            false
        }
    }
}

fn reset(conn: &mut SmtpConnection) {
    if let Err(e) = conn.command(Rset) {
        tracing::debug!(error = %e, "RSET failed");
    }
}

fn status_code(e: &lettre::transport::smtp::Error) -> String {
    e.status().map(|c| c.to_string()).unwrap_or_default()
}

fn data_rejected(e: &lettre::transport::smtp::Error) -> Error {
    Error::DataRejected {
        code: status_code(e),
        message: e.to_string(),
    }
}

fn response_text(response: &Response) -> String {
    response.message().collect::<Vec<_>>().join("\n")
}
