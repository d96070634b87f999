//! In-process mailbox: messages, markers and sent replies held in memory.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::MailboxError;
use crate::mailbox::types::{BodyPart, MarkerId, Message, SENT_MARKER, SentId, extract_address};
use crate::mailbox::{MailboxReader, MailboxWriter, MarkerStore, ReplyEnvelope, matches_query};

/// A reply recorded by [`InMemoryMailbox::send_reply`].
#[derive(Debug, Clone)]
pub struct SentReply {
    pub id: SentId,
    pub envelope: ReplyEnvelope,
    pub body: String,
}

#[derive(Default)]
struct State {
    /// Insertion order of message ids.
    order: Vec<String>,
    messages: HashMap<String, Message>,
    labels: HashMap<String, MarkerId>,
    sent: Vec<SentReply>,
}

/// Thread-safe in-memory implementation of all mailbox collaborators.
pub struct InMemoryMailbox {
    state: Mutex<State>,
    sent_marker: MarkerId,
    fail_thread_lookups: AtomicBool,
    fail_sends: AtomicBool,
}

impl Default for InMemoryMailbox {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            sent_marker: MarkerId::from(SENT_MARKER),
            fail_thread_lookups: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `marker` instead of `SENT` for owner-authored messages.
    pub fn with_sent_marker(mut self, marker: MarkerId) -> Self {
        self.sent_marker = marker;
        self
    }

    /// Add or replace a message.
    pub fn insert(&self, message: Message) -> Result<(), MailboxError> {
        let mut state = self.lock()?;
        if !state.messages.contains_key(&message.id) {
            state.order.push(message.id.clone());
        }
        state.messages.insert(message.id.clone(), message);
        Ok(())
    }

    /// Replies sent so far, in send order.
    pub fn sent(&self) -> Vec<SentReply> {
        self.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }

    /// Make `thread_markers` fail (exercises fail-closed callers).
    pub fn set_thread_lookup_failure(&self, fail: bool) {
        self.fail_thread_lookups.store(fail, Ordering::Relaxed);
    }

    /// Make `send_reply` fail.
    pub fn set_send_failure(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, MailboxError> {
        self.state
            .lock()
            .map_err(|_| MailboxError::State("in-memory mailbox lock poisoned".into()))
    }
}

#[async_trait]
impl MailboxReader for InMemoryMailbox {
    async fn list_messages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, MailboxError> {
        let state = self.lock()?;
        let sent = &self.sent_marker;
        let mut matching: Vec<(usize, &Message)> = state
            .order
            .iter()
            .enumerate()
            .filter_map(|(pos, id)| state.messages.get(id).map(|m| (pos, m)))
            .filter(|(_, m)| !m.has_marker(sent) && matches_query(m, query))
            .collect();

        // Newest first; insertion order breaks ties (later inserted first).
        matching.sort_by(|(pa, a), (pb, b)| {
            b.internal_date
                .unwrap_or(0)
                .cmp(&a.internal_date.unwrap_or(0))
                .then(pb.cmp(pa))
        });

        Ok(matching
            .into_iter()
            .take(max_results)
            .map(|(_, m)| m.id.clone())
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        self.lock()?
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| MailboxError::NotFound { id: id.to_string() })
    }

    async fn thread_markers(&self, thread_id: &str) -> Result<BTreeSet<MarkerId>, MailboxError> {
        if self.fail_thread_lookups.load(Ordering::Relaxed) {
            return Err(MailboxError::State(format!(
                "thread lookup unavailable for {thread_id}"
            )));
        }
        let state = self.lock()?;
        Ok(state
            .messages
            .values()
            .filter(|m| m.thread_id == thread_id)
            .flat_map(|m| m.markers.iter().cloned())
            .collect())
    }
}

#[async_trait]
impl MailboxWriter for InMemoryMailbox {
    async fn send_reply(
        &self,
        envelope: &ReplyEnvelope,
        body: &str,
    ) -> Result<SentId, MailboxError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(MailboxError::Send {
                reason: "sending disabled".into(),
            });
        }

        let id = format!("sent-{}", Uuid::new_v4());
        let mut message = Message::new(&id, &envelope.thread_id)
            .with_header("to", envelope.to.clone())
            .with_header("subject", envelope.subject.clone())
            .with_body(BodyPart::leaf("text/plain", crate::normalize::encode_payload(body)))
            .with_marker(self.sent_marker.clone())
            .with_internal_date(Utc::now().timestamp_millis());
        if let Some(in_reply_to) = &envelope.in_reply_to {
            message.headers.insert("in-reply-to", in_reply_to.clone());
        }

        let mut state = self.lock()?;
        state.order.push(id.clone());
        state.messages.insert(id.clone(), message);
        state.sent.push(SentReply {
            id: id.clone(),
            envelope: envelope.clone(),
            body: body.to_string(),
        });
        Ok(id)
    }

    fn check_recipients(&self, to: &str) -> Result<(), MailboxError> {
        let valid = to
            .split(',')
            .all(|recipient| extract_address(recipient).contains('@'));
        if valid {
            Ok(())
        } else {
            Err(MailboxError::Send {
                reason: format!("invalid recipient list '{to}'"),
            })
        }
    }

    async fn attach_marker(
        &self,
        message_id: &str,
        marker: &MarkerId,
    ) -> Result<bool, MailboxError> {
        let mut state = self.lock()?;
        let message = state
            .messages
            .get_mut(message_id)
            .ok_or_else(|| MailboxError::NotFound {
                id: message_id.to_string(),
            })?;
        Ok(message.markers.insert(marker.clone()))
    }
}

#[async_trait]
impl MarkerStore for InMemoryMailbox {
    async fn ensure_marker(&self, name: &str) -> Result<MarkerId, MailboxError> {
        let mut state = self.lock()?;
        let next = state.labels.len() + 1;
        Ok(state
            .labels
            .entry(name.to_string())
            .or_insert_with(|| MarkerId::new(format!("Label_{next}")))
            .clone())
    }

    fn sent_marker(&self) -> MarkerId {
        self.sent_marker.clone()
    }
}
