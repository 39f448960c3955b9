//! Account registration and credential verification
//!
//! The [`IdentityStore`] owns every registered account. Usernames are
//! unique for the lifetime of the store and accounts are never
//! deleted. Credentials are stored in whatever opaque form the
//! injected [`PasswordScheme`] produces and never leave this module.

use crate::password::{Argon2Scheme, PasswordScheme};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Public view of a registered account.
///
/// The stored credential stays inside the store; callers only ever
/// see the id and the username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
}

/// Outcome of a failed registration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    #[error("username and password must be non-empty")]
    InvalidInput,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("credential derivation failed: {0}")]
    Credential(String),
}

/// Outcome of a failed authentication.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("no account with that username")]
    UnknownAccount,

    #[error("credential verification failed")]
    BadCredential,
}

struct Account {
    id: Uuid,
    username: String,
    credential: String,
}

/// Registered accounts, keyed by username.
pub struct IdentityStore {
    scheme: Box<dyn PasswordScheme>,
    accounts: RwLock<HashMap<String, Account>>,
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore {
    /// Create a store using the default Argon2 credential scheme.
    #[must_use]
    pub fn new() -> Self {
        Self::with_scheme(Box::new(Argon2Scheme))
    }

    /// Create a store using a caller-provided credential scheme.
    #[must_use]
    pub fn with_scheme(scheme: Box<dyn PasswordScheme>) -> Self {
        Self {
            scheme,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new account.
    ///
    /// The uniqueness check and the insert happen under one write
    /// lock, so concurrent registrations of the same username yield
    /// exactly one success.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::InvalidInput`] if the username or
    /// password is empty, [`RegisterError::UsernameTaken`] if the
    /// username is already registered.
    pub fn register(&self, username: &str, password: &str) -> Result<Identity, RegisterError> {
        if username.is_empty() || password.is_empty() {
            return Err(RegisterError::InvalidInput);
        }

        // Derive outside the lock; hashing is deliberately slow.
        let credential = self
            .scheme
            .derive(password)
            .map_err(|e| RegisterError::Credential(e.to_string()))?;

        let mut accounts = self.write();
        if accounts.contains_key(username) {
            debug!("registration rejected, username taken: {username}");
            return Err(RegisterError::UsernameTaken);
        }

        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            credential,
        };
        let identity = Identity {
            id: account.id,
            username: account.username.clone(),
        };
        accounts.insert(username.to_string(), account);

        info!("registered account: {username}");
        Ok(identity)
    }

    /// Verify a username/password pair.
    ///
    /// Verifies credentials only; whether the account already has a
    /// live session is decided by the session registry's atomic
    /// `bind`, after this call succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownAccount`] if no such username
    /// exists, [`AuthError::BadCredential`] if verification fails.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let (identity, credential) = {
            let accounts = self.read();
            let account = accounts.get(username).ok_or_else(|| {
                debug!("authentication failed, unknown account: {username}");
                AuthError::UnknownAccount
            })?;
            (
                Identity {
                    id: account.id,
                    username: account.username.clone(),
                },
                account.credential.clone(),
            )
        };

        if self.scheme.verify(password, &credential) {
            Ok(identity)
        } else {
            debug!("authentication failed, bad credential: {username}");
            Err(AuthError::BadCredential)
        }
    }

    /// Look up an account by username.
    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<Identity> {
        self.read().get(username).map(|account| Identity {
            id: account.id,
            username: account.username.clone(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Account>> {
        self.accounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Account>> {
        self.accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
