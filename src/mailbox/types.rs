//! Message snapshot types shared by the normalizer, summarizers and policy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum nesting depth walked in a body part tree.
pub const MAX_PART_DEPTH: usize = 32;

// ── Markers ─────────────────────────────────────────────────────────

/// Opaque tag a mailbox attaches to a message (label id, keyword, flag).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(String);

impl MarkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Default marker a mailbox puts on messages authored by the owner.
pub const SENT_MARKER: &str = "SENT";

/// Identifier of a message produced by `MailboxWriter::send_reply`.
pub type SentId = String;

// ── Headers ─────────────────────────────────────────────────────────

/// Case-insensitive header map.
///
/// Names are stored lowercased. When a header repeats, the last value wins.
/// Lookups of missing headers yield `None` (or `""` via [`Headers::get_or_empty`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .insert(name.as_ref().trim().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

// ── Body ────────────────────────────────────────────────────────────

/// A message body: a single encoded leaf or an ordered list of child parts.
///
/// Leaf payloads are carried in the mailbox transfer encoding (URL-safe
/// base64, padding optional); see [`crate::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyPart {
    Leaf { mime_type: String, data: String },
    Node { children: Vec<BodyPart> },
}

impl BodyPart {
    pub fn leaf(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Leaf {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn node(children: Vec<BodyPart>) -> Self {
        Self::Node { children }
    }

    /// An empty body (no payload).
    pub fn empty() -> Self {
        Self::leaf("text/plain", "")
    }
}

impl Default for BodyPart {
    fn default() -> Self {
        Self::empty()
    }
}

// ── Message ─────────────────────────────────────────────────────────

/// Read-only snapshot of one mailbox message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Mailbox-unique identifier.
    pub id: String,
    /// Conversation the message belongs to.
    pub thread_id: String,
    pub headers: Headers,
    pub body: BodyPart,
    /// Markers currently attached by the mailbox.
    #[serde(default)]
    pub markers: BTreeSet<MarkerId>,
    /// Mailbox arrival time in milliseconds since the epoch.
    #[serde(default)]
    pub internal_date: Option<i64>,
}

impl Message {
    pub fn new(id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            headers: Headers::new(),
            body: BodyPart::empty(),
            markers: BTreeSet::new(),
            internal_date: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: BodyPart) -> Self {
        self.body = body;
        self
    }

    pub fn with_marker(mut self, marker: impl Into<MarkerId>) -> Self {
        self.markers.insert(marker.into());
        self
    }

    pub fn with_internal_date(mut self, millis: i64) -> Self {
        self.internal_date = Some(millis);
        self
    }

    /// Header value by case-insensitive name, `""` when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers.get_or_empty(name)
    }

    pub fn has_marker(&self, marker: &MarkerId) -> bool {
        self.markers.contains(marker)
    }

    /// Arrival time; `None` when the mailbox did not record one (absent or zero).
    pub fn arrived_at(&self) -> Option<DateTime<Utc>> {
        self.internal_date
            .filter(|ms| *ms > 0)
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Bare address of the `From` header, lowercased.
    pub fn sender_address(&self) -> String {
        extract_address(self.header("from")).to_lowercase()
    }
}

impl From<String> for MarkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Extract the bare address from a header value like `Alice <alice@ex.com>`.
///
/// Falls back to the trimmed value when there are no angle brackets.
pub fn extract_address(value: &str) -> &str {
    match (value.rfind('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].trim(),
        _ => value.trim(),
    }
}
