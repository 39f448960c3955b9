//! Wire protocol: one request line in, one response line out
//!
//! Frames are newline-delimited text. Fields within a frame are
//! joined with `%%`; multi-record responses join records with `##`.
//! Requests decode once at this boundary into a closed [`Request`]
//! enum; a frame with the wrong field count, an unknown verb, a
//! non-numeric message id, or an unknown search direction is
//! malformed and never reaches a store.
//!
//! A message record serializes as
//! `id%%sender%%recipient%%subject%%body%%sentAt%%isRead`, with
//! `sentAt` in RFC 3339. Record lists are prefixed `SUCCESS##`,
//! single records `SUCCESS%%`.

use crate::mailbox::{Direction, Message, MessageId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Separates fields within one frame or record.
pub const FIELD_DELIMITER: &str = "%%";

/// Separates records within a multi-record response.
pub const RECORD_DELIMITER: &str = "##";

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register {
        username: String,
        password: String,
        confirm_password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout {
        username: String,
    },
    SendEmail {
        recipient: String,
        subject: String,
        body: String,
    },
    GetReceivedEmails,
    GetSentEmails,
    ReadEmail {
        id: MessageId,
    },
    SearchDetails {
        direction: Direction,
        term: String,
    },
    Exit,
}

impl Request {
    /// Decode one frame. Returns `None` for any malformed frame:
    /// unknown verb, wrong arity, unparseable id or direction.
    #[must_use]
    pub fn parse(frame: &str) -> Option<Self> {
        let fields: Vec<&str> = frame.split(FIELD_DELIMITER).collect();

        match fields.as_slice() {
            ["REGISTER", username, password, confirm_password] => Some(Self::Register {
                username: (*username).to_string(),
                password: (*password).to_string(),
                confirm_password: (*confirm_password).to_string(),
            }),
            ["LOGIN", username, password] => Some(Self::Login {
                username: (*username).to_string(),
                password: (*password).to_string(),
            }),
            ["LOGOUT", username] => Some(Self::Logout {
                username: (*username).to_string(),
            }),
            ["SEND_EMAIL", recipient, subject, body] => Some(Self::SendEmail {
                recipient: (*recipient).to_string(),
                subject: (*subject).to_string(),
                body: (*body).to_string(),
            }),
            ["GET_RECEIVED_EMAILS"] => Some(Self::GetReceivedEmails),
            ["GET_SENT_EMAILS"] => Some(Self::GetSentEmails),
            ["READ_EMAIL", id] => id.parse().ok().map(|id| Self::ReadEmail { id }),
            ["SEARCH_DETAILS", direction, term] => {
                parse_direction(direction).map(|direction| Self::SearchDetails {
                    direction,
                    term: (*term).to_string(),
                })
            }
            ["EXIT"] => Some(Self::Exit),
            _ => None,
        }
    }
}

fn parse_direction(s: &str) -> Option<Direction> {
    match s {
        "RECEIVED" => Some(Direction::Received),
        "SENT" => Some(Direction::Sent),
        _ => None,
    }
}

/// Response status token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Invalid,
    UserAlreadyExists,
    PasswordsDoesntMatch,
    InvalidUsernameOrPassword,
    UserAlreadyLogged,
    UserNotLoggedIn,
    ResourceNotFound,
    RecipientNotFound,
    NoEmailsFound,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Invalid => "INVALID",
            Self::UserAlreadyExists => "USER_ALREADY_EXISTS",
            Self::PasswordsDoesntMatch => "PASSWORDS_DOESNT_MATCH",
            Self::InvalidUsernameOrPassword => "INVALID_USERNAME_OR_PASSWORD",
            Self::UserAlreadyLogged => "USER_ALREADY_LOGGED",
            Self::UserNotLoggedIn => "USER_NOT_LOGGED_IN",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            Self::NoEmailsFound => "NO_EMAILS_FOUND",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server response, one line on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A bare status token.
    Status(Status),
    /// A single message record, prefixed `SUCCESS%%`.
    Message(Message),
    /// Zero or more records. Empty serializes as `NO_EMAILS_FOUND`,
    /// otherwise `SUCCESS##` followed by `##`-joined records.
    Messages(Vec<Message>),
}

impl Response {
    /// The wire form of this response, without the trailing newline.
    #[must_use]
    pub fn serialize(&self) -> String {
        match self {
            Self::Status(status) => status.to_string(),
            Self::Message(message) => format!(
                "{}{FIELD_DELIMITER}{}",
                Status::Success,
                serialize_message(message)
            ),
            Self::Messages(messages) => {
                if messages.is_empty() {
                    return Status::NoEmailsFound.to_string();
                }
                let records: Vec<String> = messages.iter().map(serialize_message).collect();
                format!(
                    "{}{RECORD_DELIMITER}{}",
                    Status::Success,
                    records.join(RECORD_DELIMITER)
                )
            }
        }
    }
}

fn serialize_message(message: &Message) -> String {
    [
        message.id.to_string(),
        message.sender.clone(),
        message.recipient.clone(),
        message.subject.clone(),
        message.body.clone(),
        message.sent_at.to_rfc3339(),
        message.is_read.to_string(),
    ]
    .join(FIELD_DELIMITER)
}

/// Decode one `id%%sender%%recipient%%subject%%body%%sentAt%%isRead`
/// record, as emitted inside `SUCCESS` responses. Used by clients.
#[must_use]
pub fn parse_message_record(record: &str) -> Option<Message> {
    let fields: Vec<&str> = record.split(FIELD_DELIMITER).collect();
    let [id, sender, recipient, subject, body, sent_at, is_read] = fields.as_slice() else {
        return None;
    };

    Some(Message {
        id: id.parse().ok()?,
        sender: (*sender).to_string(),
        recipient: (*recipient).to_string(),
        subject: (*subject).to_string(),
        body: (*body).to_string(),
        sent_at: DateTime::parse_from_rfc3339(sent_at)
            .ok()?
            .with_timezone(&Utc),
        is_read: match *is_read {
            "true" => true,
            "false" => false,
            _ => return None,
        },
    })
}
