//! TCP listener and connection dispatch
//!
//! A [`MailServer`] owns the three shared stores and runs one
//! [`ConnectionSession`] task per accepted connection. Binding port 0
//! gives tests an OS-assigned port, exposed through [`MailServer::port`].

use crate::connection::ConnectionSession;
use crate::error::Result;
use crate::identity::IdentityStore;
use crate::mailbox::MailboxStore;
use crate::password::PasswordScheme;
use crate::registry::{ConnectionId, SessionRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The mail service: shared stores plus a bound TCP listener.
pub struct MailServer {
    listener: TcpListener,
    identity: Arc<IdentityStore>,
    registry: Arc<SessionRegistry>,
    mailbox: Arc<MailboxStore>,
}

impl MailServer {
    /// Bind to `addr` with the default Argon2 credential scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_store(addr, IdentityStore::new()).await
    }

    /// Bind to `addr` with a caller-provided credential scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind_with_scheme(addr: &str, scheme: Box<dyn PasswordScheme>) -> Result<Self> {
        Self::bind_with_store(addr, IdentityStore::with_scheme(scheme)).await
    }

    async fn bind_with_store(addr: &str, identity: IdentityStore) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            identity: Arc::new(identity),
            registry: Arc::new(SessionRegistry::new()),
            mailbox: Arc::new(MailboxStore::new()),
        })
    }

    /// The port the server is listening on.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be read.
    pub fn port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept connections forever, one session task per connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop fails.
    pub async fn serve(self) -> Result<()> {
        info!("listening on {}", self.listener.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let connection = ConnectionId::issue();
            info!("{connection}: accepted from {peer}");

            let session = ConnectionSession::new(
                stream,
                connection,
                Arc::clone(&self.identity),
                Arc::clone(&self.registry),
                Arc::clone(&self.mailbox),
            );
            tokio::spawn(session.run());
        }
    }
}
