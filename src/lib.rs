//! wiremail: a minimal networked mail service
//!
//! Clients authenticate over a persistent TCP connection, then send
//! and retrieve messages through a newline-delimited text protocol.
//! Accounts, sessions, and messages live in concurrent in-memory
//! stores shared by every connection; the store is volatile and the
//! protocol carries no encryption.
//!
//! The building blocks are exposed individually so the session state
//! machine can be driven over any in-memory channel in tests:
//! [`IdentityStore`], [`SessionRegistry`], [`MailboxStore`],
//! [`ConnectionSession`], and the [`MailServer`] that ties them to a
//! TCP listener.

mod config;
mod connection;
mod error;
mod identity;
mod mailbox;
mod password;
mod protocol;
mod registry;
mod server;

pub use config::{ClientConfig, ServerConfig};
pub use connection::ConnectionSession;
pub use error::{Error, Result};
pub use identity::{AuthError, Identity, IdentityStore, RegisterError};
pub use mailbox::{Direction, MailboxError, MailboxStore, Message, MessageId, SendError};
pub use password::{Argon2Scheme, PasswordScheme};
pub use protocol::{
    FIELD_DELIMITER, RECORD_DELIMITER, Request, Response, Status, parse_message_record,
};
pub use registry::{BindError, ConnectionId, SessionRegistry};
pub use server::MailServer;
