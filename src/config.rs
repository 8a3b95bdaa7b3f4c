//! Environment configuration.
//!
//! Settings live in `<env>/conf/config.toml`:
//!
//! ```toml
//! [project]
//! url = "https://tickets.example.com"
//!
//! [notification]
//! smtp_server = "email-smtp.eu-west-1.amazonaws.com"
//! smtp_port = 587
//! smtp_user = "AKIA..."
//! smtp_password = "..."
//! use_tls = true
//! smtp_from = "tickets@example.com"
//! ```
//!
//! Every key is optional. Environment variables override the file:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `THREADLINE_SMTP_SERVER` | `[notification] smtp_server` |
//! | `THREADLINE_SMTP_PORT` | `[notification] smtp_port` |
//! | `THREADLINE_SMTP_USER` | `[notification] smtp_user` |
//! | `THREADLINE_SMTP_PASSWORD` | `[notification] smtp_password` |
//! | `THREADLINE_USE_TLS` | `[notification] use_tls` |
//! | `THREADLINE_SMTP_FROM` | `[notification] smtp_from` |

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::error::Error;

/// `[notification]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// SMTP server hostname to use for email notifications.
    pub smtp_server: String,
    /// SMTP server port to use for email notifications.
    pub smtp_port: u16,
    /// Username for authenticating with the SMTP server.
    pub smtp_user: String,
    /// Password for authenticating with the SMTP server.
    pub smtp_password: String,
    /// Use STARTTLS to send notifications over SMTP.
    pub use_tls: bool,
    /// Sender address of notifications.
    pub smtp_from: String,
    /// Digest used when generating Message-IDs.
    pub message_id_hash: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            smtp_server: "localhost".to_string(),
            smtp_port: 25,
            smtp_user: String::new(),
            smtp_password: String::new(),
            use_tls: false,
            smtp_from: "tickets@localhost".to_string(),
            message_id_hash: "md5".to_string(),
        }
    }
}

impl NotificationConfig {
    /// Credentials, if a username is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.smtp_user.is_empty() {
            None
        } else {
            Some((&self.smtp_user, &self.smtp_password))
        }
    }
}

/// `[project]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Public URL of the ticket tracker.
    pub url: String,
}

/// Full environment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub notification: NotificationConfig,
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| {
            Error::Configuration(format!("{}: {}", path.display(), e))
        })
    }

    /// Apply `THREADLINE_*` environment variable overrides.
    pub fn apply_env_overrides(mut self) -> Result<Self, Error> {
        let n = &mut self.notification;
        if let Ok(server) = env::var("THREADLINE_SMTP_SERVER") {
            n.smtp_server = server;
        }
        if let Ok(port) = env::var("THREADLINE_SMTP_PORT") {
            n.smtp_port = port.parse().map_err(|_| {
                Error::Configuration(format!("THREADLINE_SMTP_PORT is not a port: {port}"))
            })?;
        }
        if let Ok(user) = env::var("THREADLINE_SMTP_USER") {
            n.smtp_user = user;
        }
        if let Ok(password) = env::var("THREADLINE_SMTP_PASSWORD") {
            n.smtp_password = password;
        }
        if let Ok(flag) = env::var("THREADLINE_USE_TLS") {
            n.use_tls = parse_bool(&flag).ok_or_else(|| {
                Error::Configuration(format!("THREADLINE_USE_TLS is not a boolean: {flag}"))
            })?;
        }
        if let Ok(from) = env::var("THREADLINE_SMTP_FROM") {
            n.smtp_from = from;
        }
        Ok(self)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.notification.smtp_server, "localhost");
        assert_eq!(config.notification.smtp_port, 25);
        assert!(!config.notification.use_tls);
        assert!(config.notification.credentials().is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [project]
            url = "https://tickets.example.com"

            [notification]
            smtp_server = "email-smtp.us-east-1.amazonaws.com"
            smtp_user = "user"
            smtp_password = "secret"
            use_tls = true
            "#,
        )
        .unwrap();

        assert_eq!(config.project.url, "https://tickets.example.com");
        assert_eq!(
            config.notification.smtp_server,
            "email-smtp.us-east-1.amazonaws.com"
        );
        assert_eq!(config.notification.smtp_port, 25);
        assert!(config.notification.use_tls);
        assert_eq!(config.notification.credentials(), Some(("user", "secret")));
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = Config::from_toml("[notification]\nsmtp_port = \"abc\"").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/threadline/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
