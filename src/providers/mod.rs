//! Relay implementations.
//!
//! Each relay implements the [`Relay`](crate::Relay) trait.
//!
//! ## Available Relays
//!
//! | Relay | Feature Flag | Description |
//! |-------|-------------|-------------|
//! | [`SmtpRelay`] | `smtp` | SMTP via lettre, STARTTLS and AUTH |
//! | [`LocalRelay`] | (none) | In-memory capture for dev/testing |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::SmtpRelay;

mod local;
pub use local::LocalRelay;
