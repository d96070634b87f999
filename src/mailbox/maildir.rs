//! Directory mailbox: `.eml` files on disk with a JSON marker store.
//!
//! Layout under the inbox directory:
//! - `*.eml`: inbound messages; the file stem is the message id
//! - `state.json`: labels, per-message markers and the sent log
//! - `outbox/`: replies written as RFC 5322 files
//!
//! Messages whose sender is the owner address carry the configured sent
//! marker (`SENT` by default), and every sent reply registers it on its
//! thread. Parsed messages are cached per file until its size or
//! modification time changes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, Mailboxes};
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use crate::mailbox::types::{
    BodyPart, Headers, MAX_PART_DEPTH, MarkerId, Message, SentId, extract_address,
};
use crate::mailbox::{MailboxReader, MailboxWriter, MarkerStore, ReplyEnvelope, matches_query};

const STATE_FILE: &str = "state.json";
const OUTBOX_DIR: &str = "outbox";
const EML_EXTENSION: &str = "eml";

/// A reply written to the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentRecord {
    pub id: SentId,
    pub thread_id: String,
    pub to: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
}

/// A parsed `.eml` file, valid while the file is unchanged.
#[derive(Debug)]
struct CachedMessage {
    modified: SystemTime,
    len: u64,
    message: Message,
}

/// Persisted mailbox state.
#[derive(Debug, Default, Serialize, Deserialize)]
struct MailboxState {
    /// Label name → marker id.
    #[serde(default)]
    labels: BTreeMap<String, MarkerId>,
    /// Message id → attached markers.
    #[serde(default)]
    markers: BTreeMap<String, BTreeSet<MarkerId>>,
    #[serde(default)]
    sent: Vec<SentRecord>,
    #[serde(skip)]
    parsed: HashMap<String, CachedMessage>,
}

/// Mailbox backed by a directory of `.eml` files.
pub struct DirectoryMailbox {
    root: PathBuf,
    owner_address: String,
    sent_marker: MarkerId,
    state: Mutex<MailboxState>,
}

impl DirectoryMailbox {
    /// Open (creating if needed) the mailbox at `config.inbox_dir`.
    pub async fn open(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let root = config.inbox_dir.clone();
        tokio::fs::create_dir_all(root.join(OUTBOX_DIR)).await?;

        let state_path = root.join(STATE_FILE);
        let state = match tokio::fs::read(&state_path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MailboxState::default(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %root.display(), "Opened directory mailbox");
        Ok(Self {
            root,
            owner_address: extract_address(&config.owner_address).to_lowercase(),
            sent_marker: config.sent_marker.clone(),
            state: Mutex::new(state),
        })
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.root.join(OUTBOX_DIR)
    }

    /// Replies sent so far, oldest first.
    pub async fn sent_records(&self) -> Vec<SentRecord> {
        self.state.lock().await.sent.clone()
    }

    /// Path of a message file; `None` for ids that are not plain file stems.
    fn message_path(&self, id: &str) -> Option<PathBuf> {
        let plain = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && id != STATE_FILE;
        plain.then(|| self.root.join(format!("{id}.{EML_EXTENSION}")))
    }

    async fn load_message(
        &self,
        id: &str,
        state: &mut MailboxState,
    ) -> Result<Message, MailboxError> {
        let not_found = || MailboxError::NotFound { id: id.to_string() };
        let path = self.message_path(id).ok_or_else(not_found)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let modified = metadata.modified().ok();
        let len = metadata.len();

        let cached = state
            .parsed
            .get(id)
            .filter(|c| Some(c.modified) == modified && c.len == len)
            .map(|c| c.message.clone());
        let mut message = match cached {
            Some(message) => message,
            None => {
                let raw = tokio::fs::read(&path).await?;
                let fallback = modified.map(|t| DateTime::<Utc>::from(t).timestamp_millis());
                let message = parse_eml(id, &raw, fallback)?;
                if let Some(modified) = modified {
                    state.parsed.insert(
                        id.to_string(),
                        CachedMessage {
                            modified,
                            len,
                            message: message.clone(),
                        },
                    );
                }
                message
            }
        };
        self.apply_markers(&mut message, state);
        Ok(message)
    }

    fn apply_markers(&self, message: &mut Message, state: &MailboxState) {
        if let Some(markers) = state.markers.get(&message.id) {
            message.markers.extend(markers.iter().cloned());
        }
        if !self.owner_address.is_empty() && message.sender_address() == self.owner_address {
            message.markers.insert(self.sent_marker.clone());
        }
    }

    /// Every parseable message in the inbox. Unparseable files are skipped.
    async fn load_all(&self, state: &mut MailboxState) -> Result<Vec<Message>, MailboxError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut messages = Vec::new();
        let mut seen = HashSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EML_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            seen.insert(id.to_string());
            match self.load_message(id, state).await {
                Ok(message) => messages.push(message),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable message"),
            }
        }
        state.parsed.retain(|id, _| seen.contains(id));
        Ok(messages)
    }

    async fn persist(&self, state: &MailboxState) -> Result<(), MailboxError> {
        let path = self.root.join(STATE_FILE);
        let tmp = self.root.join(format!("{STATE_FILE}.tmp"));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().await
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse a raw RFC 5322 message into a [`Message`] without markers.
///
/// The `Date` header gives the arrival time, falling back to `fallback_date`
/// (milliseconds). The thread id is the root of `References`, else
/// `In-Reply-To`, else the message's own `Message-ID`, else `id`.
pub fn parse_eml(
    id: &str,
    raw: &[u8],
    fallback_date: Option<i64>,
) -> Result<Message, MailboxError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailboxError::Parse {
            id: id.to_string(),
            reason: "not an RFC 5322 message".into(),
        })?;

    let raw_message = parsed.raw_message();
    let mut headers = Headers::new();
    for header in parsed.headers() {
        let name = header.name.as_str();
        let value = if name.eq_ignore_ascii_case("subject") {
            header.value.as_text().map(str::to_string)
        } else {
            raw_message
                .get(header.offset_start as usize..header.offset_end as usize)
                .map(unfold)
        };
        if let Some(value) = value {
            headers.insert(name, value);
        }
    }

    let body = match parsed.parts.first() {
        Some(root) => build_part(&parsed.parts, root, 0),
        None => BodyPart::empty(),
    };

    let internal_date = parsed
        .date()
        .map(|d| d.to_timestamp() * 1000)
        .or(fallback_date);

    let thread_id = thread_root(&headers).unwrap_or_else(|| id.to_string());

    Ok(Message {
        id: id.to_string(),
        thread_id,
        headers,
        body,
        markers: BTreeSet::new(),
        internal_date,
    })
}

/// Header value bytes → single-line string.
fn unfold(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_id(value: &str) -> Option<String> {
    value
        .split_whitespace()
        .next()
        .map(|id| id.trim_matches(['<', '>']).to_string())
        .filter(|id| !id.is_empty())
}

fn thread_root(headers: &Headers) -> Option<String> {
    ["references", "in-reply-to", "message-id"]
        .into_iter()
        .find_map(|name| headers.get(name).and_then(first_id))
}

fn build_part(parts: &[MessagePart<'_>], part: &MessagePart<'_>, depth: usize) -> BodyPart {
    if depth >= MAX_PART_DEPTH {
        return BodyPart::node(Vec::new());
    }
    match &part.body {
        PartType::Text(text) => BodyPart::leaf(mime_type(part, "text/plain"), encode_text(text)),
        PartType::Html(html) => BodyPart::leaf(mime_type(part, "text/html"), encode_text(html)),
        PartType::Binary(data) | PartType::InlineBinary(data) => BodyPart::leaf(
            mime_type(part, "application/octet-stream"),
            URL_SAFE_NO_PAD.encode(data.as_ref()),
        ),
        PartType::Message(nested) => BodyPart::leaf(
            "message/rfc822",
            URL_SAFE_NO_PAD.encode(nested.raw_message()),
        ),
        PartType::Multipart(children) => BodyPart::node(
            children
                .iter()
                .filter_map(|child| parts.get(*child as usize))
                .map(|child| build_part(parts, child, depth + 1))
                .collect(),
        ),
    }
}

fn encode_text(text: &str) -> String {
    crate::normalize::encode_payload(text)
}

fn mime_type(part: &MessagePart<'_>, fallback: &str) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .map(|m| m.to_ascii_lowercase())
        .unwrap_or_else(|| fallback.to_string())
}

// ── Collaborator impls ──────────────────────────────────────────────

#[async_trait]
impl MailboxReader for DirectoryMailbox {
    async fn list_messages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, MailboxError> {
        let mut state = self.lock().await;
        let mut messages: Vec<Message> = self
            .load_all(&mut state)
            .await?
            .into_iter()
            .filter(|m| !m.has_marker(&self.sent_marker) && matches_query(m, query))
            .collect();

        messages.sort_by(|a, b| {
            b.internal_date
                .unwrap_or(0)
                .cmp(&a.internal_date.unwrap_or(0))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(query, matched = messages.len(), "Listed directory mailbox");

        Ok(messages
            .into_iter()
            .take(max_results)
            .map(|m| m.id)
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        let mut state = self.lock().await;
        self.load_message(id, &mut state).await
    }

    async fn thread_markers(&self, thread_id: &str) -> Result<BTreeSet<MarkerId>, MailboxError> {
        let mut state = self.lock().await;
        let mut markers: BTreeSet<MarkerId> = self
            .load_all(&mut state)
            .await?
            .into_iter()
            .filter(|m| m.thread_id == thread_id)
            .flat_map(|m| m.markers)
            .collect();
        if state.sent.iter().any(|s| s.thread_id == thread_id) {
            markers.insert(self.sent_marker.clone());
        }
        Ok(markers)
    }
}

#[async_trait]
impl MailboxWriter for DirectoryMailbox {
    async fn send_reply(
        &self,
        envelope: &ReplyEnvelope,
        body: &str,
    ) -> Result<SentId, MailboxError> {
        let send_error = |reason: String| MailboxError::Send { reason };

        let from: Mailbox = self
            .owner_address
            .parse()
            .map_err(|e| send_error(format!("Invalid from address: {e}")))?;
        let to = parse_recipients(&envelope.to)?;

        let mut builder = lettre::Message::builder()
            .from(from)
            .subject(envelope.subject.clone());
        for recipient in to {
            builder = builder.to(recipient);
        }
        if let Some(in_reply_to) = &envelope.in_reply_to {
            builder = builder.in_reply_to(in_reply_to.clone());
        }
        if let Some(references) = &envelope.references {
            builder = builder.references(references.clone());
        }
        let email = builder
            .body(body.to_string())
            .map_err(|e| send_error(format!("Failed to build email: {e}")))?;

        let id = format!("sent-{}", Uuid::new_v4());
        let path = self.outbox_dir().join(format!("{id}.{EML_EXTENSION}"));

        let mut state = self.lock().await;
        tokio::fs::write(&path, email.formatted()).await?;
        state.sent.push(SentRecord {
            id: id.clone(),
            thread_id: envelope.thread_id.clone(),
            to: envelope.to.clone(),
            subject: envelope.subject.clone(),
            sent_at: Utc::now(),
        });
        self.persist(&state).await?;

        info!(sent_id = %id, path = %path.display(), "Reply written to outbox");
        Ok(id)
    }

    fn check_recipients(&self, to: &str) -> Result<(), MailboxError> {
        parse_recipients(to).map(|_| ())
    }

    async fn attach_marker(
        &self,
        message_id: &str,
        marker: &MarkerId,
    ) -> Result<bool, MailboxError> {
        let mut state = self.lock().await;
        let exists = match self.message_path(message_id) {
            Some(path) => tokio::fs::try_exists(&path).await?,
            None => false,
        };
        if !exists {
            return Err(MailboxError::NotFound {
                id: message_id.to_string(),
            });
        }

        let attached = state
            .markers
            .entry(message_id.to_string())
            .or_default()
            .insert(marker.clone());
        if attached {
            self.persist(&state).await?;
        }
        Ok(attached)
    }
}

#[async_trait]
impl MarkerStore for DirectoryMailbox {
    async fn ensure_marker(&self, name: &str) -> Result<MarkerId, MailboxError> {
        let mut state = self.lock().await;
        if let Some(existing) = state.labels.get(name) {
            return Ok(existing.clone());
        }
        let marker = MarkerId::new(format!("Label_{}", state.labels.len() + 1));
        state.labels.insert(name.to_string(), marker.clone());
        self.persist(&state).await?;
        info!(label = name, marker = %marker, "Created marker");
        Ok(marker)
    }

    fn sent_marker(&self) -> MarkerId {
        self.sent_marker.clone()
    }
}

/// Comma-separated recipient list; at least one address.
fn parse_recipients(to: &str) -> Result<Mailboxes, MailboxError> {
    let recipients: Mailboxes = to.parse().map_err(|e| MailboxError::Send {
        reason: format!("Invalid to address '{to}': {e}"),
    })?;
    if recipients.iter().next().is_none() {
        return Err(MailboxError::Send {
            reason: "Reply has no recipients".into(),
        });
    }
    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::mailbox::types::SENT_MARKER;
    use crate::normalize::normalize;

    const OWNER: &str = "me@example.com";

    fn config(dir: &TempDir) -> MailboxConfig {
        MailboxConfig {
            inbox_dir: dir.path().to_path_buf(),
            owner_address: format!("Me <{OWNER}>"),
            sent_marker: MarkerId::from(SENT_MARKER),
        }
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        std::fs::write(dir.path().join(name), content.replace('\n', "\r\n")).unwrap();
    }

    const PLAIN: &str = "From: Alice <alice@example.com>
To: me@example.com
Subject: Dinner plans
Date: Mon, 2 Jun 2025 10:00:00 +0000
Message-ID: <dinner-2@example.com>
References: <dinner-1@example.com>
 <dinner-1b@example.com>

Shall we meet at eight?
";

    const ALTERNATIVE: &str = "From: Bob <bob@example.com>
To: me@example.com
Subject: Invoice
Date: Tue, 3 Jun 2025 10:00:00 +0000
Message-ID: <invoice@example.com>
MIME-Version: 1.0
Content-Type: multipart/alternative; boundary=\"b1\"

--b1
Content-Type: text/plain; charset=utf-8

Invoice attached.
--b1
Content-Type: text/html; charset=utf-8

<p>Invoice <b>attached</b>.</p>
--b1--
";

    const OWN: &str = "From: Me <me@example.com>
To: alice@example.com
Subject: Re: Dinner plans
Date: Wed, 4 Jun 2025 10:00:00 +0000
Message-ID: <mine@example.com>
In-Reply-To: <dinner-1@example.com>

Sounds good.
";

    #[test]
    fn parses_headers_body_date_and_thread() {
        let msg = parse_eml("dinner", PLAIN.replace('\n', "\r\n").as_bytes(), None).unwrap();
        assert_eq!(msg.header("subject"), "Dinner plans");
        assert_eq!(msg.header("from"), "Alice <alice@example.com>");
        assert_eq!(msg.header("message-id"), "<dinner-2@example.com>");
        assert_eq!(
            msg.header("references"),
            "<dinner-1@example.com> <dinner-1b@example.com>"
        );
        assert_eq!(msg.thread_id, "dinner-1@example.com");
        assert_eq!(msg.internal_date, Some(1_748_858_400_000));
        assert_eq!(normalize(&msg.body).trim(), "Shall we meet at eight?");
    }

    #[test]
    fn multipart_alternative_prefers_plain_text() {
        let msg = parse_eml("inv", ALTERNATIVE.replace('\n', "\r\n").as_bytes(), None).unwrap();
        assert!(matches!(msg.body, BodyPart::Node { ref children } if children.len() == 2));
        assert_eq!(normalize(&msg.body).trim(), "Invoice attached.");
        assert_eq!(msg.thread_id, "invoice@example.com");
    }

    #[test]
    fn missing_date_uses_fallback_and_missing_ids_use_file_id() {
        let raw = "From: x@example.com\r\nSubject: hi\r\n\r\nbody\r\n";
        let msg = parse_eml("file-7", raw.as_bytes(), Some(42)).unwrap();
        assert_eq!(msg.internal_date, Some(42));
        assert_eq!(msg.thread_id, "file-7");
    }

    #[tokio::test]
    async fn lists_newest_first_without_owner_messages() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dinner.eml", PLAIN);
        write(&dir, "invoice.eml", ALTERNATIVE);
        write(&dir, "mine.eml", OWN);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();

        assert_eq!(mb.list_messages("", 10).await.unwrap(), vec!["invoice", "dinner"]);
        assert_eq!(mb.list_messages("alice", 10).await.unwrap(), vec!["dinner"]);
        assert_eq!(mb.list_messages("", 1).await.unwrap(), vec!["invoice"]);
    }

    #[tokio::test]
    async fn owner_message_marks_thread_as_replied() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dinner.eml", PLAIN);
        write(&dir, "mine.eml", OWN);
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();

        let markers = mb.thread_markers("dinner-1@example.com").await.unwrap();
        assert!(markers.contains(&MarkerId::from(SENT_MARKER)));
        assert!(mb.thread_markers("invoice@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_sent_marker_is_used_for_owner_messages_and_replies() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dinner.eml", PLAIN);
        write(&dir, "mine.eml", OWN);
        let outgoing = MarkerId::from("OUTGOING");
        let mb = DirectoryMailbox::open(&MailboxConfig {
            sent_marker: outgoing.clone(),
            ..config(&dir)
        })
        .await
        .unwrap();

        assert_eq!(mb.sent_marker(), outgoing);
        let markers = mb.thread_markers("dinner-1@example.com").await.unwrap();
        assert!(markers.contains(&outgoing));
        assert!(!markers.contains(&MarkerId::from(SENT_MARKER)));
        assert_eq!(mb.list_messages("", 10).await.unwrap(), vec!["dinner"]);

        let envelope = ReplyEnvelope {
            thread_id: "other-thread".into(),
            to: "alice@example.com".into(),
            subject: "Re: x".into(),
            in_reply_to: None,
            references: None,
        };
        mb.send_reply(&envelope, "ok").await.unwrap();
        assert!(mb.thread_markers("other-thread").await.unwrap().contains(&outgoing));
    }

    #[tokio::test]
    async fn unchanged_files_are_not_reparsed() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dinner.eml", PLAIN);
        let path = dir.path().join("dinner.eml");
        let original = std::fs::metadata(&path).unwrap().modified().unwrap();
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();
        assert_eq!(mb.get_message("dinner").await.unwrap().header("subject"), "Dinner plans");

        // Same size and modification time: the cached parse is served.
        write(&dir, "dinner.eml", &PLAIN.replace("Dinner plans", "Supper plans"));
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(original).unwrap();
        assert_eq!(mb.get_message("dinner").await.unwrap().header("subject"), "Dinner plans");

        file.set_modified(original + std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(mb.get_message("dinner").await.unwrap().header("subject"), "Supper plans");
    }

    #[tokio::test]
    async fn removed_files_leave_the_listing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dinner.eml", PLAIN);
        write(&dir, "invoice.eml", ALTERNATIVE);
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();
        assert_eq!(mb.list_messages("", 10).await.unwrap().len(), 2);

        std::fs::remove_file(dir.path().join("invoice.eml")).unwrap();
        assert_eq!(mb.list_messages("", 10).await.unwrap(), vec!["dinner"]);
        assert!(matches!(
            mb.get_message("invoice").await,
            Err(MailboxError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn markers_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dinner.eml", PLAIN);
        let marker = {
            let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();
            let marker = mb.ensure_marker("AutoReplied").await.unwrap();
            assert!(mb.attach_marker("dinner", &marker).await.unwrap());
            assert!(!mb.attach_marker("dinner", &marker).await.unwrap());
            marker
        };

        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();
        assert_eq!(mb.ensure_marker("AutoReplied").await.unwrap(), marker);
        assert!(mb.get_message("dinner").await.unwrap().has_marker(&marker));
    }

    #[tokio::test]
    async fn unknown_or_unsafe_ids_are_not_found() {
        let dir = TempDir::new().unwrap();
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();
        for id in ["nope", "../etc/passwd", ""] {
            assert!(matches!(
                mb.get_message(id).await,
                Err(MailboxError::NotFound { .. })
            ));
        }
        let marker = MarkerId::from("Label_1");
        assert!(matches!(
            mb.attach_marker("nope", &marker).await,
            Err(MailboxError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn reply_is_written_to_outbox_and_joins_thread() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dinner.eml", PLAIN);
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();

        let envelope = ReplyEnvelope {
            thread_id: "dinner-1@example.com".into(),
            to: "Alice <alice@example.com>".into(),
            subject: "Re: Dinner plans".into(),
            in_reply_to: Some("<dinner-2@example.com>".into()),
            references: Some("<dinner-1@example.com> <dinner-2@example.com>".into()),
        };
        let id = mb.send_reply(&envelope, "Eight works.").await.unwrap();

        let written =
            std::fs::read_to_string(mb.outbox_dir().join(format!("{id}.eml"))).unwrap();
        assert!(written.contains("In-Reply-To: <dinner-2@example.com>"));
        assert!(written.contains("Subject: Re: Dinner plans"));
        assert!(written.contains("Eight works."));

        let markers = mb.thread_markers("dinner-1@example.com").await.unwrap();
        assert!(markers.contains(&MarkerId::from(SENT_MARKER)));
        assert_eq!(mb.sent_records().await.len(), 1);
        // Outbox files are not part of the inbox listing.
        assert_eq!(mb.list_messages("", 10).await.unwrap(), vec!["dinner"]);
    }

    #[tokio::test]
    async fn reply_to_several_recipients() {
        let dir = TempDir::new().unwrap();
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();
        let to = "alice@example.com, Bob <bob@example.com>";
        assert!(mb.check_recipients(to).is_ok());

        let envelope = ReplyEnvelope {
            thread_id: "t".into(),
            to: to.into(),
            subject: "Re: plans".into(),
            in_reply_to: None,
            references: None,
        };
        let id = mb.send_reply(&envelope, "Both of you.").await.unwrap();
        let written =
            std::fs::read_to_string(mb.outbox_dir().join(format!("{id}.eml"))).unwrap();
        let to_line = written
            .lines()
            .find(|line| line.starts_with("To:"))
            .unwrap();
        assert!(to_line.contains("alice@example.com"));
        assert!(to_line.contains("bob@example.com"));
    }

    #[tokio::test]
    async fn invalid_recipient_is_a_send_error() {
        let dir = TempDir::new().unwrap();
        let mb = DirectoryMailbox::open(&config(&dir)).await.unwrap();
        let envelope = ReplyEnvelope {
            thread_id: "t".into(),
            to: "not an address".into(),
            subject: "Re: x".into(),
            in_reply_to: None,
            references: None,
        };
        assert!(matches!(
            mb.send_reply(&envelope, "x").await,
            Err(MailboxError::Send { .. })
        ));
        assert!(mb.check_recipients("not an address").is_err());
        assert!(mb.check_recipients("").is_err());
    }
}
