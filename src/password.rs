//! Credential hashing and verification
//!
//! The identity store never sees plaintext passwords at rest: it
//! stores an opaque credential string produced by a [`PasswordScheme`]
//! and checks logins through the scheme's one-way `verify`. The
//! scheme is injected at store construction, so tests can swap the
//! real Argon2 implementation for a cheap one.

use crate::error::{Error, Result};
use argon2::Argon2;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// One-way password hashing seam.
///
/// `derive` turns a plaintext password into an opaque stored
/// credential; `verify` checks a plaintext against one. The stored
/// form is entirely the scheme's business.
pub trait PasswordScheme: Send + Sync {
    /// Derive a stored credential from a plaintext password.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying hash computation fails.
    fn derive(&self, plain: &str) -> Result<String>;

    /// Check a plaintext password against a stored credential.
    ///
    /// Returns `false` for malformed credentials rather than erroring;
    /// a corrupt stored value behaves like a wrong password.
    fn verify(&self, plain: &str, stored: &str) -> bool;
}

/// Argon2id with a random per-credential salt.
///
/// The stored credential is `hex(salt)$hex(hash)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Scheme;

impl PasswordScheme for Argon2Scheme {
    fn derive(&self, plain: &str) -> Result<String> {
        let salt: [u8; SALT_LEN] = rand::random();
        let hash = hash_with_salt(plain, &salt)?;
        Ok(format!("{}${}", hex(&salt), hex(&hash)))
    }

    fn verify(&self, plain: &str, stored: &str) -> bool {
        let Some((salt_hex, hash_hex)) = stored.split_once('$') else {
            return false;
        };
        let (Some(salt), Some(expected)) = (unhex(salt_hex), unhex(hash_hex)) else {
            return false;
        };
        hash_with_salt(plain, &salt).is_ok_and(|hash| hash.as_slice() == expected.as_slice())
    }
}

fn hash_with_salt(plain: &str, salt: &[u8]) -> Result<[u8; HASH_LEN]> {
    let mut hash = [0u8; HASH_LEN];
    Argon2::default()
        .hash_password_into(plain.as_bytes(), salt, &mut hash)
        .map_err(|e| Error::Credential(format!("Password hashing failed: {e}")))?;
    Ok(hash)
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::new(), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_then_verify_roundtrip() {
        let scheme = Argon2Scheme;
        let stored = scheme.derive("Secr3t!!pass1").unwrap();
        assert!(scheme.verify("Secr3t!!pass1", &stored));
    }

    #[test]
    fn wrong_password_fails() {
        let scheme = Argon2Scheme;
        let stored = scheme.derive("Secr3t!!pass1").unwrap();
        assert!(!scheme.verify("Secr3t!!pass2", &stored));
    }

    #[test]
    fn stored_credential_is_not_plaintext() {
        let scheme = Argon2Scheme;
        let stored = scheme.derive("Secr3t!!pass1").unwrap();
        assert!(!stored.contains("Secr3t"));
    }

    #[test]
    fn salted_hashes_differ_between_derivations() {
        let scheme = Argon2Scheme;
        let a = scheme.derive("same-password").unwrap();
        let b = scheme.derive("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_credential_never_verifies() {
        let scheme = Argon2Scheme;
        assert!(!scheme.verify("anything", "not-a-credential"));
        assert!(!scheme.verify("anything", "zzzz$zzzz"));
        assert!(!scheme.verify("anything", ""));
    }
}
