//! Message-ID resolution.
//!
//! Amazon SES discards the Message-ID a client supplies and issues its own,
//! reporting it in the final `250` reply to `DATA`:
//!
//! ```text
//! 250 Ok 0100018c9a4c2b1e-6f1a...-000000
//! ```
//!
//! Recipients see `<0100018c...@<region>.amazonses.com>`, so that is the id
//! later notifications must reply to.

use regex::Regex;
use std::sync::OnceLock;

fn ses_host() -> &'static Regex {
    static SES_HOST: OnceLock<Regex> = OnceLock::new();
    SES_HOST.get_or_init(|| {
        Regex::new(r"^email-smtp\.([a-z0-9-]+)\.amazonaws\.com$").expect("valid regex")
    })
}

/// Region of an SES SMTP endpoint such as `email-smtp.us-east-1.amazonaws.com`.
pub fn ses_region(smtp_server: &str) -> Option<&str> {
    ses_host()
        .captures(smtp_server)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Message-ID recipients will actually see.
///
/// Returns the relay-issued id when `smtp_server` is an SES endpoint and
/// `response` is `Ok <id>`; otherwise returns `message_id` unchanged.
pub fn resolve(smtp_server: &str, message_id: &str, response: &str) -> String {
    if let Some(region) = ses_region(smtp_server) {
        let parts: Vec<&str> = response.split_whitespace().collect();
        if let ["Ok", ses_id] = parts.as_slice() {
            let resolved = format!("<{ses_id}@{region}.amazonses.com>");
            tracing::debug!(
                original = message_id,
                resolved = %resolved,
                "Using SES-issued Message-ID"
            );
            return resolved;
        }
        tracing::debug!(response, "Unexpected SES response, keeping Message-ID");
    }
    message_id.to_string()
}
