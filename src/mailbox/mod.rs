//! Mailbox collaborators.
//!
//! The triage engine only reads message snapshots and thread markers; sending
//! and marking are done by the caller through [`MailboxWriter`]. Two
//! implementations ship with the crate:
//! - [`InMemoryMailbox`]: process-local, used by tests and embedding callers
//! - [`DirectoryMailbox`]: `.eml` inbox on disk with a JSON marker store

pub mod maildir;
pub mod memory;
pub mod types;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailboxError;

pub use maildir::DirectoryMailbox;
pub use memory::InMemoryMailbox;
pub use types::{BodyPart, Headers, MarkerId, Message, SENT_MARKER, SentId};

/// Addressing for an outgoing reply inside an existing thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub thread_id: String,
    pub to: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

/// Read side of the mailbox.
#[async_trait]
pub trait MailboxReader: Send + Sync {
    /// Ids of messages matching `query`, newest first, at most `max_results`.
    async fn list_messages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, MailboxError>;

    /// Full snapshot of one message.
    async fn get_message(&self, id: &str) -> Result<Message, MailboxError>;

    /// Union of markers present on any message in the thread.
    async fn thread_markers(&self, thread_id: &str) -> Result<BTreeSet<MarkerId>, MailboxError>;
}

/// Write side of the mailbox.
#[async_trait]
pub trait MailboxWriter: Send + Sync {
    /// Send `body` as a reply and return the id of the sent message.
    async fn send_reply(&self, envelope: &ReplyEnvelope, body: &str)
    -> Result<SentId, MailboxError>;

    /// Reject recipients `send_reply` could never deliver to.
    ///
    /// Called before a message is claimed, so an undeliverable address does
    /// not leave the message marked without a reply.
    fn check_recipients(&self, _to: &str) -> Result<(), MailboxError> {
        Ok(())
    }

    /// Attach `marker` to a message.
    ///
    /// Returns `true` if the marker was newly attached and `false` if it was
    /// already present. Implementations must make the check-and-attach atomic
    /// so only one concurrent caller observes `true`.
    async fn attach_marker(&self, message_id: &str, marker: &MarkerId)
    -> Result<bool, MailboxError>;
}

/// Label/marker registry.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Id of the marker called `name`, creating it on first use.
    async fn ensure_marker(&self, name: &str) -> Result<MarkerId, MailboxError>;

    /// Marker this mailbox reports on messages the owner sent, including
    /// replies sent through its writer.
    fn sent_marker(&self) -> MarkerId;
}

/// Simple query filter shared by the bundled mailboxes.
///
/// Empty (or `*`) matches everything; otherwise a case-insensitive
/// substring match against `from` or `subject`.
pub fn matches_query(message: &Message, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() || query == "*" {
        return true;
    }
    let needle = query.to_lowercase();
    message.header("from").to_lowercase().contains(&needle)
        || message.header("subject").to_lowercase().contains(&needle)
}
