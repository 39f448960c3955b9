//! Server connection configuration

use crate::error::{Error, Result};
use std::env;

/// Network configuration for the mail server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load server configuration from environment variables
    ///
    /// Reads from `.env` file if present. All variables are optional
    /// (with defaults):
    /// - `WIREMAIL_HOST` (default: `127.0.0.1`)
    /// - `WIREMAIL_PORT` (default: `6969`)
    ///
    /// # Errors
    ///
    /// Returns an error if `WIREMAIL_PORT` is not a valid port number.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("WIREMAIL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("WIREMAIL_PORT")
                .unwrap_or_else(|_| "6969".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid WIREMAIL_PORT: {e}")))?,
        })
    }

    /// The `host:port` address string this configuration points at.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection and credential configuration for the client CLI
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ClientConfig {
    /// Load client configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `WIREMAIL_USERNAME`
    /// - `WIREMAIL_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `WIREMAIL_HOST` (default: `127.0.0.1`)
    /// - `WIREMAIL_PORT` (default: `6969`)
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the port
    /// is invalid.
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig::from_env()?;

        Ok(Self {
            host: server.host,
            port: server.port,
            username: env::var("WIREMAIL_USERNAME")
                .map_err(|_| Error::Config("WIREMAIL_USERNAME not set".into()))?,
            password: env::var("WIREMAIL_PASSWORD")
                .map_err(|_| Error::Config("WIREMAIL_PASSWORD not set".into()))?,
        })
    }

    /// The `host:port` address string this configuration points at.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
