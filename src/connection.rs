//! Per-connection protocol session
//!
//! A [`ConnectionSession`] owns one bidirectional line channel and
//! walks it through the session lifecycle:
//!
//! ```text
//!   UNAUTHENTICATED --LOGIN--> AUTHENTICATED --LOGOUT--> TERMINATED
//!          \------------------EXIT / disconnect---------------/
//! ```
//!
//! Each iteration reads one frame, decodes it, dispatches to the
//! shared stores, and writes exactly one response line. The session
//! is strictly sequential: a request completes before the next is
//! read. Disconnection (EOF or a transport error) runs the same
//! registry cleanup as an explicit logout, without a response.
//!
//! The channel is any `AsyncRead + AsyncWrite`, so tests can drive a
//! session over an in-memory duplex pipe instead of a TCP socket.

use crate::identity::{AuthError, IdentityStore, RegisterError};
use crate::mailbox::MailboxStore;
use crate::protocol::{Request, Response, Status};
use crate::registry::{ConnectionId, SessionRegistry};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

enum SessionState {
    Unauthenticated,
    Authenticated { username: String },
    Terminated,
}

/// One client connection's protocol state machine.
pub struct ConnectionSession<S> {
    stream: BufReader<S>,
    connection: ConnectionId,
    identity: Arc<IdentityStore>,
    registry: Arc<SessionRegistry>,
    mailbox: Arc<MailboxStore>,
    state: SessionState,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ConnectionSession<S> {
    #[must_use]
    pub fn new(
        stream: S,
        connection: ConnectionId,
        identity: Arc<IdentityStore>,
        registry: Arc<SessionRegistry>,
        mailbox: Arc<MailboxStore>,
    ) -> Self {
        Self {
            stream: BufReader::new(stream),
            connection,
            identity,
            registry,
            mailbox,
            state: SessionState::Unauthenticated,
        }
    }

    /// Serve the connection until logout, exit, or disconnect.
    pub async fn run(mut self) {
        let mut line = String::new();

        loop {
            line.clear();
            match self.stream.read_line(&mut line).await {
                Ok(0) => {
                    debug!("{}: channel closed by peer", self.connection);
                    break;
                }
                Err(e) => {
                    debug!("{}: read failed: {e}", self.connection);
                    break;
                }
                Ok(_) => {}
            }

            let frame = line.trim_end_matches(['\r', '\n']);
            if frame.is_empty() {
                continue;
            }

            let response = Request::parse(frame).map_or(Response::Status(Status::Invalid), |req| {
                self.dispatch(req)
            });

            if self.write_line(&response.serialize()).await.is_err() {
                debug!("{}: write failed", self.connection);
                break;
            }

            if matches!(self.state, SessionState::Terminated) {
                break;
            }
        }

        // Covers abrupt disconnects; a no-op after an explicit logout.
        self.registry.unbind(self.connection);
    }

    fn dispatch(&mut self, request: Request) -> Response {
        match &self.state {
            SessionState::Unauthenticated => self.dispatch_unauthenticated(request),
            SessionState::Authenticated { username } => {
                let username = username.clone();
                self.dispatch_authenticated(request, &username)
            }
            // Unreachable from `run`, which stops reading once
            // terminated.
            SessionState::Terminated => Response::Status(Status::Invalid),
        }
    }

    fn dispatch_unauthenticated(&mut self, request: Request) -> Response {
        match request {
            Request::Register {
                username,
                password,
                confirm_password,
            } => self.handle_register(&username, &password, &confirm_password),
            Request::Login { username, password } => self.handle_login(&username, &password),
            Request::Exit => {
                self.state = SessionState::Terminated;
                Response::Status(Status::Success)
            }
            Request::Logout { .. }
            | Request::SendEmail { .. }
            | Request::GetReceivedEmails
            | Request::GetSentEmails
            | Request::ReadEmail { .. }
            | Request::SearchDetails { .. } => Response::Status(Status::UserNotLoggedIn),
        }
    }

    fn dispatch_authenticated(&mut self, request: Request, username: &str) -> Response {
        match request {
            Request::SendEmail {
                recipient,
                subject,
                body,
            } => match self.mailbox.send(username, &recipient, &subject, &body) {
                Ok(_) => Response::Status(Status::Success),
                Err(crate::mailbox::SendError::InvalidInput) => Response::Status(Status::Invalid),
                Err(crate::mailbox::SendError::UnknownRecipient) => {
                    Response::Status(Status::RecipientNotFound)
                }
            },
            Request::GetReceivedEmails => Response::Messages(self.mailbox.list_received(username)),
            Request::GetSentEmails => Response::Messages(self.mailbox.list_sent(username)),
            Request::ReadEmail { id } => self
                .mailbox
                .read(id, username)
                .map_or(Response::Status(Status::ResourceNotFound), Response::Message),
            Request::SearchDetails { direction, term } => {
                Response::Messages(self.mailbox.search(username, direction, &term))
            }
            Request::Logout { username: named } => {
                if named != username {
                    return Response::Status(Status::Invalid);
                }
                self.registry.unbind(self.connection);
                self.state = SessionState::Terminated;
                info!("{}: {username} logged out", self.connection);
                Response::Status(Status::Success)
            }
            // A fresh login requires a fresh connection.
            Request::Register { .. } | Request::Login { .. } | Request::Exit => {
                Response::Status(Status::Invalid)
            }
        }
    }

    fn handle_register(&self, username: &str, password: &str, confirm_password: &str) -> Response {
        // Mismatched confirmation never reaches the identity store.
        if password != confirm_password {
            return Response::Status(Status::PasswordsDoesntMatch);
        }

        match self.identity.register(username, password) {
            Ok(identity) => {
                // A freshly registered username cannot already hold a
                // mailbox.
                self.mailbox.initialize_mailbox(&identity.username).ok();
                Response::Status(Status::Success)
            }
            Err(RegisterError::UsernameTaken) => Response::Status(Status::UserAlreadyExists),
            Err(RegisterError::InvalidInput | RegisterError::Credential(_)) => {
                Response::Status(Status::Invalid)
            }
        }
    }

    fn handle_login(&mut self, username: &str, password: &str) -> Response {
        match self.identity.authenticate(username, password) {
            Ok(identity) => {
                // The already-active check and the session insert are
                // one atomic operation inside bind.
                if self.registry.bind(self.connection, &identity.username).is_err() {
                    return Response::Status(Status::UserAlreadyLogged);
                }
                info!("{}: {username} logged in", self.connection);
                self.state = SessionState::Authenticated {
                    username: identity.username,
                };
                Response::Status(Status::Success)
            }
            Err(AuthError::UnknownAccount | AuthError::BadCredential) => {
                Response::Status(Status::InvalidUsernameOrPassword)
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct Stores {
        identity: Arc<IdentityStore>,
        registry: Arc<SessionRegistry>,
        mailbox: Arc<MailboxStore>,
    }

    impl Stores {
        fn new() -> Self {
            Self {
                identity: Arc::new(IdentityStore::new()),
                registry: Arc::new(SessionRegistry::new()),
                mailbox: Arc::new(MailboxStore::new()),
            }
        }

        /// Spawn a session over an in-memory pipe and hand back the
        /// client end plus the session's connection id.
        fn connect(&self) -> (BufReader<DuplexStream>, ConnectionId) {
            let (client, server) = tokio::io::duplex(4096);
            let connection = ConnectionId::issue();
            let session = ConnectionSession::new(
                server,
                connection,
                Arc::clone(&self.identity),
                Arc::clone(&self.registry),
                Arc::clone(&self.mailbox),
            );
            tokio::spawn(session.run());
            (BufReader::new(client), connection)
        }
    }

    async fn request(client: &mut BufReader<DuplexStream>, frame: &str) -> String {
        client
            .get_mut()
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .unwrap();
        let mut line = String::new();
        client.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    #[tokio::test]
    async fn register_and_login() {
        let stores = Stores::new();
        let (mut client, _) = stores.connect();

        assert_eq!(request(&mut client, "REGISTER%%alice%%pw%%pw").await, "SUCCESS");
        assert_eq!(request(&mut client, "LOGIN%%alice%%pw").await, "SUCCESS");
    }

    #[tokio::test]
    async fn register_password_mismatch_never_creates_account() {
        let stores = Stores::new();
        let (mut client, _) = stores.connect();

        assert_eq!(
            request(&mut client, "REGISTER%%alice%%pw%%other").await,
            "PASSWORDS_DOESNT_MATCH"
        );
        assert!(stores.identity.lookup("alice").is_none());
    }

    #[tokio::test]
    async fn mail_operations_require_login() {
        let stores = Stores::new();
        let (mut client, _) = stores.connect();

        assert_eq!(
            request(&mut client, "SEND_EMAIL%%bob%%Hi%%there").await,
            "USER_NOT_LOGGED_IN"
        );
        assert_eq!(
            request(&mut client, "GET_RECEIVED_EMAILS").await,
            "USER_NOT_LOGGED_IN"
        );
        assert_eq!(request(&mut client, "LOGOUT%%alice").await, "USER_NOT_LOGGED_IN");
    }

    #[tokio::test]
    async fn malformed_frames_are_invalid() {
        let stores = Stores::new();
        let (mut client, _) = stores.connect();

        assert_eq!(request(&mut client, "NONSENSE").await, "INVALID");
        assert_eq!(request(&mut client, "LOGIN%%alice").await, "INVALID");
        assert_eq!(request(&mut client, "READ_EMAIL%%abc").await, "INVALID");
    }

    #[tokio::test]
    async fn login_in_authenticated_state_is_invalid() {
        let stores = Stores::new();
        let (mut client, _) = stores.connect();

        request(&mut client, "REGISTER%%alice%%pw%%pw").await;
        request(&mut client, "LOGIN%%alice%%pw").await;
        assert_eq!(request(&mut client, "LOGIN%%alice%%pw").await, "INVALID");
        assert_eq!(request(&mut client, "REGISTER%%bob%%pw%%pw").await, "INVALID");
    }

    #[tokio::test]
    async fn send_list_read_flow() {
        let stores = Stores::new();

        let (mut alice, _) = stores.connect();
        request(&mut alice, "REGISTER%%alice%%pw%%pw").await;
        let (mut bob, _) = stores.connect();
        request(&mut bob, "REGISTER%%bob%%pw%%pw").await;

        request(&mut alice, "LOGIN%%alice%%pw").await;
        assert_eq!(
            request(&mut alice, "SEND_EMAIL%%bob%%Hi%%there").await,
            "SUCCESS"
        );

        request(&mut bob, "LOGIN%%bob%%pw").await;
        let inbox = request(&mut bob, "GET_RECEIVED_EMAILS").await;
        assert!(inbox.starts_with("SUCCESS##"));
        assert!(inbox.contains("%%alice%%bob%%Hi%%there%%"));
        assert!(inbox.ends_with("%%false"));

        let read = request(&mut bob, "READ_EMAIL%%1").await;
        assert!(read.starts_with("SUCCESS%%1%%alice%%bob%%Hi%%there%%"));
        assert!(read.ends_with("%%true"));
    }

    #[tokio::test]
    async fn logout_requires_own_username() {
        let stores = Stores::new();
        let (mut client, connection) = stores.connect();

        request(&mut client, "REGISTER%%alice%%pw%%pw").await;
        request(&mut client, "LOGIN%%alice%%pw").await;

        assert_eq!(request(&mut client, "LOGOUT%%bob").await, "INVALID");
        assert_eq!(
            stores.registry.username_of(connection),
            Some("alice".to_string())
        );

        assert_eq!(request(&mut client, "LOGOUT%%alice").await, "SUCCESS");
        assert_eq!(stores.registry.username_of(connection), None);
    }

    #[tokio::test]
    async fn disconnect_unbinds_the_session() {
        let stores = Stores::new();
        let (mut client, connection) = stores.connect();

        request(&mut client, "REGISTER%%alice%%pw%%pw").await;
        request(&mut client, "LOGIN%%alice%%pw").await;
        assert_eq!(
            stores.registry.username_of(connection),
            Some("alice".to_string())
        );

        drop(client);

        // The session task observes EOF and cleans up; poll until it
        // does.
        for _ in 0..50 {
            if stores.registry.username_of(connection).is_none() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("session was not unbound after disconnect");
    }

    #[tokio::test]
    async fn exit_terminates_the_channel() {
        let stores = Stores::new();
        let (mut client, _) = stores.connect();

        assert_eq!(request(&mut client, "EXIT").await, "SUCCESS");

        let mut line = String::new();
        let read = client.read_line(&mut line).await.unwrap();
        assert_eq!(read, 0);
    }
}
