//! Message selection: which listed messages a triage run acts on.
//!
//! By default a run triages everything the query returns. A run can instead
//! target the message that arrived at a given moment, either by its arrival
//! time within a tolerance or by substrings of its `Date` header.

use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use tracing::{debug, warn};

use crate::error::{ConfigError, MailboxError};
use crate::mailbox::MailboxReader;
use crate::mailbox::types::Message;

/// Default distance from the target arrival time that still matches.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Default `strftime` format of a wall-clock target.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Target arrival time (epoch milliseconds) with a symmetric tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalWindow {
    pub target_ms: i64,
    pub tolerance: Duration,
}

impl ArrivalWindow {
    pub fn new(target_ms: i64, tolerance: Duration) -> Self {
        Self {
            target_ms,
            tolerance,
        }
    }

    /// Target given as wall-clock time at a fixed UTC offset,
    /// e.g. `"2025-11-28 16:15"` at `+05:30`.
    pub fn from_local(
        datetime: &str,
        format: &str,
        offset: FixedOffset,
        tolerance: Duration,
    ) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "TRIAGE_TARGET_DATETIME".into(),
            message,
        };
        let naive = NaiveDateTime::parse_from_str(datetime.trim(), format)
            .map_err(|e| invalid(format!("'{datetime}' does not match '{format}': {e}")))?;
        let local = offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| invalid(format!("'{datetime}' is not a valid local time")))?;
        Ok(Self::new(local.timestamp_millis(), tolerance))
    }

    /// Whether an arrival time lies within the tolerance (inclusive).
    /// Unknown arrival times never match.
    pub fn contains(&self, internal_date: Option<i64>) -> bool {
        let Some(arrived) = internal_date.filter(|&ms| ms > 0) else {
            return false;
        };
        let tolerance = u64::try_from(self.tolerance.as_millis()).unwrap_or(u64::MAX);
        arrived.abs_diff(self.target_ms) <= tolerance
    }
}

/// `Date` header heuristic: both substrings appear, ignoring case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateHeaderMatch {
    pub date: String,
    pub time: String,
}

impl DateHeaderMatch {
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            date: date.into().to_lowercase(),
            time: time.into().to_lowercase(),
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        let value = message.header("date").to_lowercase();
        !value.is_empty() && value.contains(&self.date) && value.contains(&self.time)
    }
}

/// Which of the listed messages a run triages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MessageSelector {
    #[default]
    All,
    Arrival(ArrivalWindow),
    DateHeader(DateHeaderMatch),
}

impl MessageSelector {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::All => true,
            Self::Arrival(window) => window.contains(message.internal_date),
            Self::DateHeader(pattern) => pattern.matches(message),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Arrival(_) => "arrival",
            Self::DateHeader(_) => "date_header",
        }
    }
}

/// Parse a UTC offset such as `+05:30`, `-8`, `Z` or `UTC`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: "TRIAGE_TARGET_UTC_OFFSET".into(),
        message: format!("'{value}' is not an offset like +05:30"),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }
    let sign = if trimmed.starts_with('-') { -1 } else { 1 };
    let mut parts = trimmed.trim_start_matches(['+', '-']).split(':');
    let hours: i32 = parts
        .next()
        .and_then(|h| h.parse().ok())
        .ok_or_else(invalid)?;
    let minutes: i32 = match parts.next() {
        Some(m) => m.parse().map_err(|_| invalid())?,
        None => 0,
    };
    if parts.next().is_some() || !(0..60).contains(&minutes) {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Fetch the messages `query` lists and keep those `selector` matches,
/// in listing order. Messages that fail to load are logged and skipped.
pub async fn select_messages(
    reader: &dyn MailboxReader,
    query: &str,
    max_results: usize,
    selector: &MessageSelector,
) -> Result<Vec<Message>, MailboxError> {
    let ids = reader.list_messages(query, max_results).await?;
    let listed = ids.len();

    let mut selected = Vec::new();
    for id in ids {
        match reader.get_message(&id).await {
            Ok(message) if selector.matches(&message) => selected.push(message),
            Ok(_) => {}
            Err(e) => warn!(message_id = %id, error = %e, "Failed to load message"),
        }
    }

    debug!(
        selector = selector.label(),
        listed,
        selected = selected.len(),
        "Selected messages"
    );
    Ok(selected)
}

/// Messages listed by `query` that arrived within `window`.
pub async fn find_by_arrival(
    reader: &dyn MailboxReader,
    query: &str,
    max_results: usize,
    window: &ArrivalWindow,
) -> Result<Vec<Message>, MailboxError> {
    select_messages(reader, query, max_results, &MessageSelector::Arrival(*window)).await
}
