//! Live session tracking
//!
//! The [`SessionRegistry`] maps each active connection to the
//! username authenticated on it, and enforces the single-session-per-
//! account policy: `bind` refuses a username that is already bound to
//! another live connection. The check and the insert share one lock
//! acquisition, so two racing logins for the same account cannot both
//! win.
//!
//! Sessions are keyed by [`ConnectionId`], an opaque identifier issued
//! at accept time, not by the transport handle itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::info;

/// Process-wide connection id counter
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Issue a fresh id, unique for the lifetime of the process.
    #[must_use]
    pub fn issue() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of a failed bind.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BindError {
    #[error("account already has an active session")]
    AlreadyActive,
}

/// Live `connection -> username` bindings.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, String>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to an authenticated username.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::AlreadyActive`] if the username is bound
    /// to a different live connection.
    pub fn bind(&self, connection: ConnectionId, username: &str) -> Result<(), BindError> {
        let mut sessions = self.lock();
        if sessions
            .iter()
            .any(|(bound, user)| user == username && *bound != connection)
        {
            return Err(BindError::AlreadyActive);
        }
        sessions.insert(connection, username.to_string());
        info!("session bound: {connection} -> {username}");
        Ok(())
    }

    /// Remove any binding for the connection.
    ///
    /// Safe to call multiple times; explicit logout and disconnect
    /// cleanup both go through here.
    pub fn unbind(&self, connection: ConnectionId) {
        if let Some(username) = self.lock().remove(&connection) {
            info!("session unbound: {connection} -> {username}");
        }
    }

    /// The username bound to a connection, if any.
    #[must_use]
    pub fn username_of(&self, connection: ConnectionId) -> Option<String> {
        self.lock().get(&connection).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, String>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
