//! Message storage and per-user mailbox views
//!
//! The [`MailboxStore`] owns every message in the system. Each
//! message belongs to exactly one sender and one recipient and is
//! visible in two views: the sender's "sent" view and the
//! recipient's "received" view. Both views reference the same stored
//! message, so a read-state change is observable from either side.
//!
//! A single mutex covers the id counter, the message table, and the
//! view indexes. Sends therefore allocate their id and appear in both
//! views in one critical section: no reader can observe a message in
//! one view but not the other, and no two messages share an id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Unique, monotonically assigned message identifier.
pub type MessageId = u64;

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Which side of a user's mailbox an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Received,
    Sent,
}

/// Outcome of a failed mailbox initialization.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MailboxError {
    #[error("mailbox is already initialized")]
    AlreadyInitialized,
}

/// Outcome of a failed send.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SendError {
    #[error("sender, recipient, subject and body must be non-empty")]
    InvalidInput,

    #[error("recipient has no mailbox")]
    UnknownRecipient,
}

#[derive(Default)]
struct MailboxInner {
    next_id: MessageId,
    messages: HashMap<MessageId, Message>,
    views: HashMap<String, Vec<MessageId>>,
}

/// All messages, plus one view index per mailbox-holding user.
#[derive(Default)]
pub struct MailboxStore {
    inner: Mutex<MailboxInner>,
}

impl MailboxStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty view for a newly registered account.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::AlreadyInitialized`] if the user
    /// already has a mailbox.
    pub fn initialize_mailbox(&self, username: &str) -> Result<(), MailboxError> {
        let mut inner = self.lock();
        if inner.views.contains_key(username) {
            return Err(MailboxError::AlreadyInitialized);
        }
        inner.views.insert(username.to_string(), Vec::new());
        debug!("mailbox initialized: {username}");
        Ok(())
    }

    /// Store a new message and make it visible to sender and
    /// recipient at once.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidInput`] if any field is empty,
    /// [`SendError::UnknownRecipient`] if the recipient has no
    /// mailbox. On error no message is created.
    pub fn send(
        &self,
        sender: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<MessageId, SendError> {
        if [sender, recipient, subject, body]
            .iter()
            .any(|field| field.is_empty())
        {
            return Err(SendError::InvalidInput);
        }

        let mut inner = self.lock();
        if !inner.views.contains_key(recipient) {
            debug!("send rejected, no mailbox for recipient: {recipient}");
            return Err(SendError::UnknownRecipient);
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let message = Message {
            id,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
            is_read: false,
        };
        inner.messages.insert(id, message);

        inner.views.entry(sender.to_string()).or_default().push(id);
        if sender != recipient {
            inner
                .views
                .entry(recipient.to_string())
                .or_default()
                .push(id);
        }

        info!("message {id} sent: {sender} -> {recipient}");
        Ok(id)
    }

    /// Messages received by the user, in send order.
    #[must_use]
    pub fn list_received(&self, username: &str) -> Vec<Message> {
        self.view(username, Direction::Received)
    }

    /// Messages sent by the user, in send order.
    #[must_use]
    pub fn list_sent(&self, username: &str) -> Vec<Message> {
        self.view(username, Direction::Sent)
    }

    /// Fetch a message by id, scoped to the caller's own views.
    ///
    /// Returns `None` when no such message is visible to `username`
    /// as sender or recipient. When the recipient reads a previously
    /// unread message, `is_read` flips to true; re-reads return the
    /// message unchanged. A sender reading their own copy never
    /// alters the read state.
    #[must_use]
    pub fn read(&self, id: MessageId, username: &str) -> Option<Message> {
        let mut inner = self.lock();
        if !inner.views.get(username).is_some_and(|ids| ids.contains(&id)) {
            return None;
        }

        let message = inner.messages.get_mut(&id)?;
        if message.recipient == username && !message.is_read {
            message.is_read = true;
            debug!("message {id} marked read by {username}");
        }
        Some(message.clone())
    }

    /// Messages in one of the user's views whose subject contains
    /// `term` as a literal, case-sensitive substring, in send order.
    #[must_use]
    pub fn search(&self, username: &str, direction: Direction, term: &str) -> Vec<Message> {
        let mut messages = self.view(username, direction);
        messages.retain(|message| message.subject.contains(term));
        messages
    }

    fn view(&self, username: &str, direction: Direction) -> Vec<Message> {
        let inner = self.lock();
        let Some(ids) = inner.views.get(username) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| inner.messages.get(id))
            .filter(|message| match direction {
                Direction::Received => message.recipient == username,
                Direction::Sent => message.sender == username,
            })
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MailboxInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> MailboxStore {
        let store = MailboxStore::new();
        store.initialize_mailbox("alice").unwrap();
        store.initialize_mailbox("bob").unwrap();
        store
    }

    #[test]
    fn initialize_twice_fails() {
        let store = store();
        assert_eq!(
            store.initialize_mailbox("alice"),
            Err(MailboxError::AlreadyInitialized)
        );
    }

    #[test]
    fn send_is_visible_in_both_views() {
        let store = store();
        let id = store.send("alice", "bob", "Subject", "Body").unwrap();

        let sent = store.list_sent("alice");
        let received = store.list_received("bob");

        assert_eq!(sent.len(), 1);
        assert_eq!(received.len(), 1);
        assert_eq!(sent[0].id, id);
        assert_eq!(received[0].id, id);
        assert_eq!(sent[0], received[0]);
    }

    #[test]
    fn send_rejects_empty_fields() {
        let store = store();
        assert_eq!(
            store.send("alice", "bob", "", "Body"),
            Err(SendError::InvalidInput)
        );
        assert_eq!(
            store.send("alice", "bob", "Subject", ""),
            Err(SendError::InvalidInput)
        );
        assert_eq!(
            store.send("alice", "", "Subject", "Body"),
            Err(SendError::InvalidInput)
        );
    }

    #[test]
    fn send_to_unknown_recipient_creates_nothing() {
        let store = store();
        assert_eq!(
            store.send("alice", "charlie", "Oops", "Body"),
            Err(SendError::UnknownRecipient)
        );
        assert!(store.list_sent("alice").is_empty());
        assert!(store.list_received("alice").is_empty());
    }

    #[test]
    fn views_are_direction_scoped() {
        let store = store();
        store.send("alice", "bob", "Hello", "one").unwrap();
        store.send("bob", "alice", "Reply", "two").unwrap();

        let alice_inbox = store.list_received("alice");
        assert_eq!(alice_inbox.len(), 1);
        assert_eq!(alice_inbox[0].sender, "bob");

        let alice_sent = store.list_sent("alice");
        assert_eq!(alice_sent.len(), 1);
        assert_eq!(alice_sent[0].recipient, "bob");
    }

    #[test]
    fn list_preserves_send_order() {
        let store = store();
        store.send("alice", "bob", "first", "1").unwrap();
        store.send("alice", "bob", "second", "2").unwrap();
        store.send("alice", "bob", "third", "3").unwrap();

        let subjects: Vec<_> = store
            .list_received("bob")
            .into_iter()
            .map(|m| m.subject)
            .collect();
        assert_eq!(subjects, ["first", "second", "third"]);
    }

    #[test]
    fn ids_are_monotonic() {
        let store = store();
        let first = store.send("alice", "bob", "a", "1").unwrap();
        let second = store.send("bob", "alice", "b", "2").unwrap();
        assert!(second > first);
    }

    #[test]
    fn read_marks_unread_message_read() {
        let store = store();
        let id = store.send("alice", "bob", "Hello", "Body").unwrap();

        assert!(!store.list_received("bob")[0].is_read);

        let message = store.read(id, "bob").unwrap();
        assert!(message.is_read);

        // Visible from the sender's view as well.
        assert!(store.list_sent("alice")[0].is_read);
    }

    #[test]
    fn read_is_idempotent() {
        let store = store();
        let id = store.send("alice", "bob", "Hello", "Body").unwrap();
        store.read(id, "bob").unwrap();
        let again = store.read(id, "bob").unwrap();
        assert!(again.is_read);
    }

    #[test]
    fn sender_read_does_not_flip_state() {
        let store = store();
        let id = store.send("alice", "bob", "Hello", "Body").unwrap();

        let from_sender = store.read(id, "alice").unwrap();
        assert!(!from_sender.is_read);
        assert!(!store.list_received("bob")[0].is_read);
    }

    #[test]
    fn read_unknown_id_returns_none() {
        let store = store();
        assert!(store.read(999, "alice").is_none());
    }

    #[test]
    fn read_is_scoped_to_the_callers_view() {
        let store = store();
        store.initialize_mailbox("charlie").unwrap();
        let id = store.send("alice", "bob", "Private", "Body").unwrap();

        assert!(store.read(id, "charlie").is_none());
        assert!(!store.list_received("bob")[0].is_read);
    }

    #[test]
    fn search_matches_literal_substring_in_direction() {
        let store = store();
        store.send("alice", "bob", "Hello World", "1").unwrap();
        store.send("bob", "alice", "Hi World", "2").unwrap();
        store.send("bob", "alice", "Not Matching", "3").unwrap();

        let results = store.search("alice", Direction::Received, "World");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subject, "Hi World");

        // Case-sensitive: lowercase does not match.
        assert!(store.search("alice", Direction::Received, "world").is_empty());
    }

    #[test]
    fn search_sent_returns_only_own_sent_mail() {
        let store = store();
        store.send("alice", "bob", "Hi bob", "1").unwrap();
        store.send("bob", "alice", "Hi alice", "2").unwrap();

        let results = store.search("alice", Direction::Sent, "Hi");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].recipient, "bob");
    }

    #[test]
    fn self_send_appears_once_per_view() {
        let store = store();
        store.send("alice", "alice", "Note", "to self").unwrap();

        assert_eq!(store.list_sent("alice").len(), 1);
        assert_eq!(store.list_received("alice").len(), 1);
    }

    #[test]
    fn concurrent_sends_allocate_unique_ids() {
        let store = Arc::new(store());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .send("alice", "bob", &format!("subject {i}"), "body")
                        .unwrap()
                })
            })
            .collect();

        let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}
