//! Deterministic Message-ID generation.
//!
//! The tracker names the creation notification of ticket `N` with a
//! Message-ID derived only from the project URL, `N` and the sender address:
//!
//! ```text
//! source = "{project_url}.{N}.0.ticket"
//! id     = "<{len(source):03}.{hex(digest(source))}@{sender domain}>"
//! ```
//!
//! The backfill tool relies on this being a pure function: it recomputes the
//! ids of historical notifications instead of reading them from a mail log.
//! If the tracker's generator ever takes other inputs (a timestamp, a random
//! salt) the recomputed ids no longer match and backfilling is meaningless.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::config::Config;
use crate::error::Error;

/// Computes the Message-ID of a ticket's creation notification.
pub trait MessageIdGenerator: Send + Sync {
    fn creation_message_id(&self, ticket_id: i64, from_address: &str) -> String;
}

/// Digest used by [`HashedMessageIdGenerator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageIdHash {
    /// The tracker's default.
    #[default]
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl MessageIdHash {
    /// Parse a `message_id_hash` setting.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(Error::Configuration(format!(
                "unknown [notification] message_id_hash {other:?}; \
                 expected one of md5, sha1, sha224, sha256, sha384, sha512"
            ))),
        }
    }

    fn hex_digest(self, data: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(data)),
            Self::Sha1 => hex::encode(Sha1::digest(data)),
            Self::Sha224 => hex::encode(Sha224::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha384 => hex::encode(Sha384::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

/// The tracker's own generator.
#[derive(Debug, Clone)]
pub struct HashedMessageIdGenerator {
    project_url: String,
    hash: MessageIdHash,
}

impl HashedMessageIdGenerator {
    pub fn new(project_url: impl Into<String>, hash: MessageIdHash) -> Self {
        Self {
            project_url: project_url.into(),
            hash,
        }
    }

    /// Build the generator an environment's tracker uses.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Ok(Self::new(
            config.project.url.clone(),
            MessageIdHash::from_name(&config.notification.message_id_hash)?,
        ))
    }
}

impl MessageIdGenerator for HashedMessageIdGenerator {
    fn creation_message_id(&self, ticket_id: i64, from_address: &str) -> String {
        let source = format!("{}.{}.0.ticket", self.project_url, ticket_id);
        let digest = self.hash.hex_digest(source.as_bytes());
        let host = from_address
            .split_once('@')
            .map_or(from_address, |(_, domain)| domain);
        format!("<{:03}.{}@{}>", source.len(), digest, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_and_determinism() {
        let generator =
            HashedMessageIdGenerator::new("https://tickets.example.com", MessageIdHash::Sha256);
        let a = generator.creation_message_id(12, "tickets@example.com");
        let b = generator.creation_message_id(12, "tickets@example.com");
        assert_eq!(a, b);

        // "https://tickets.example.com.12.0.ticket" is 39 bytes
        assert!(a.starts_with("<039."), "{a}");
        assert!(a.ends_with("@example.com>"), "{a}");
        // 64 hex digits for sha256
        let digest = &a[5..a.find('@').unwrap()];
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_default_hash_matches_tracker_ids() {
        let config = Config {
            project: crate::config::ProjectConfig {
                url: "https://tickets.example.com".into(),
            },
            ..Config::default()
        };
        let generator = HashedMessageIdGenerator::from_config(&config).unwrap();
        assert_eq!(
            generator.creation_message_id(12, "tickets@example.com"),
            "<039.9b597e927f056008fc4dd793ca3c510b@example.com>"
        );
    }

    #[test]
    fn test_sha1_id() {
        let generator =
            HashedMessageIdGenerator::new("https://tickets.example.com", MessageIdHash::Sha1);
        assert_eq!(
            generator.creation_message_id(12, "tickets@example.com"),
            "<039.e068ff9ef7fd0baf148b16627dcc1f95cfa09ab9@example.com>"
        );
    }

    #[test]
    fn test_distinct_tickets_get_distinct_ids() {
        let generator = HashedMessageIdGenerator::new("", MessageIdHash::Sha224);
        assert_ne!(
            generator.creation_message_id(1, "a@b"),
            generator.creation_message_id(2, "a@b")
        );
    }

    #[test]
    fn test_sender_without_domain() {
        let generator = HashedMessageIdGenerator::new("", MessageIdHash::Sha256);
        assert!(generator.creation_message_id(1, "localhost").ends_with("@localhost>"));
    }

    #[test]
    fn test_unknown_hash_is_configuration_error() {
        assert!(MessageIdHash::from_name("md4").unwrap_err().is_configuration());
        assert_eq!(MessageIdHash::from_name("SHA512").unwrap(), MessageIdHash::Sha512);
        assert_eq!(MessageIdHash::from_name("md5").unwrap(), MessageIdHash::Md5);
        assert_eq!(MessageIdHash::from_name("sha1").unwrap(), MessageIdHash::Sha1);
    }
}
