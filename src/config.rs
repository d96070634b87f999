//! Configuration types.
//!
//! Everything is read from environment variables by `from_env()`; the
//! `from_lookup()` variants take any key → value source so tests never touch
//! the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::mailbox::types::{MarkerId, SENT_MARKER};
use crate::pipeline::select::{
    ArrivalWindow, DEFAULT_DATETIME_FORMAT, DEFAULT_TOLERANCE, DateHeaderMatch, MessageSelector,
    parse_utc_offset,
};

/// Default marker name attached to messages that received an automated reply.
pub const DEFAULT_LABEL_NAME: &str = "AutoReplied";

/// Default minimum message age before auto-replying: 6 hours.
pub const DEFAULT_MIN_AGE_SECS: u64 = 6 * 60 * 60;

/// Which summarizer a triage pass uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryMode {
    #[default]
    Extractive,
    Abstractive,
}

impl FromStr for SummaryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extractive" => Ok(Self::Extractive),
            "abstractive" | "transformer" => Ok(Self::Abstractive),
            other => Err(ConfigError::InvalidValue {
                key: "TRIAGE_MODE".into(),
                message: format!("expected 'extractive' or 'abstractive', got '{other}'"),
            }),
        }
    }
}

/// Output length range and chunking parameters for abstractive summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLimits {
    /// Minimum summary length passed to the capability.
    pub min_length: usize,
    /// Maximum summary length passed to the capability.
    pub max_length: usize,
    /// Tokens shared by consecutive chunks (clamped to half a window).
    pub overlap_tokens: usize,
    /// Tokens reserved for the model's special tokens.
    pub safety_margin: usize,
    /// Per-call timeout; `None` waits indefinitely.
    pub chunk_timeout: Option<Duration>,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            min_length: 30,
            max_length: 130,
            overlap_tokens: 128,
            safety_margin: 16,
            chunk_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Inputs to the eligibility policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Messages younger than this are not replied to.
    pub min_age: Duration,
    /// De-duplication marker attached once a reply has been sent.
    pub processed_marker: MarkerId,
    /// Marker the mailbox puts on messages the owner sent.
    pub owner_sent_marker: MarkerId,
}

impl PolicyConfig {
    pub fn new(processed_marker: MarkerId, min_age: Duration) -> Self {
        Self {
            min_age,
            processed_marker,
            owner_sent_marker: MarkerId::from(SENT_MARKER),
        }
    }
}

/// Reply body rendering options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerConfig {
    /// Name used to sign the default template.
    pub your_name: String,
    /// Custom template; `{summary}` and `{subject}` are substituted.
    pub template: Option<String>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            your_name: "Inbox Triage".to_string(),
            template: None,
        }
    }
}

/// On-disk mailbox location.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Directory holding `.eml` files (plus `state.json` and `outbox/`).
    pub inbox_dir: PathBuf,
    /// Address of the mailbox owner; used as `From` on replies.
    pub owner_address: String,
    /// Marker put on owner-authored messages and on threads with a sent reply.
    pub sent_marker: MarkerId,
}

impl MailboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let inbox_dir = lookup("TRIAGE_INBOX_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("TRIAGE_INBOX_DIR".into()))?;
        let owner_address =
            lookup("TRIAGE_OWNER_ADDRESS").unwrap_or_else(|| "me@localhost".to_string());
        let sent_marker = lookup("TRIAGE_SENT_MARKER")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(MarkerId::new)
            .unwrap_or_else(|| MarkerId::from(SENT_MARKER));
        Ok(Self {
            inbox_dir,
            owner_address,
            sent_marker,
        })
    }
}

/// Settings for one triage run.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Mailbox query selecting candidate messages.
    pub query: String,
    pub max_results: usize,
    /// Narrows the listed messages, e.g. to one arrival time.
    pub selection: MessageSelector,
    /// Messages triaged concurrently.
    pub concurrency: usize,
    pub mode: SummaryMode,
    pub max_sentences: usize,
    /// Token budget of the abstractive summarization model.
    pub max_input_tokens: usize,
    pub limits: SummaryLimits,
    /// Send replies at all (otherwise summarize only).
    pub auto_reply: bool,
    /// Compute replies without sending or marking.
    pub dry_run: bool,
    pub min_age: Duration,
    pub label_name: String,
    pub composer: ComposerConfig,
    /// Model used by the abstractive summarizer.
    pub model: String,
    pub api_key: Option<SecretString>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_results: 5,
            selection: MessageSelector::All,
            concurrency: 1,
            mode: SummaryMode::Extractive,
            max_sentences: 3,
            max_input_tokens: 1024,
            limits: SummaryLimits::default(),
            auto_reply: false,
            dry_run: true,
            min_age: Duration::from_secs(DEFAULT_MIN_AGE_SECS),
            label_name: DEFAULT_LABEL_NAME.to_string(),
            composer: ComposerConfig::default(),
            model: "claude-3-5-haiku-latest".to_string(),
            api_key: None,
        }
    }
}

impl TriageConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match get("TRIAGE_MODE") {
            Some(v) => v.parse()?,
            None => defaults.mode,
        };

        let limits = SummaryLimits {
            min_length: parse_or(&get, "TRIAGE_MIN_LENGTH", defaults.limits.min_length)?,
            max_length: parse_or(&get, "TRIAGE_MAX_LENGTH", defaults.limits.max_length)?,
            overlap_tokens: parse_or(
                &get,
                "TRIAGE_CHUNK_OVERLAP_TOKENS",
                defaults.limits.overlap_tokens,
            )?,
            safety_margin: defaults.limits.safety_margin,
            chunk_timeout: match parse_or(&get, "TRIAGE_CHUNK_TIMEOUT_SECS", 120_u64)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        };
        if limits.min_length > limits.max_length {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_MIN_LENGTH".into(),
                message: format!(
                    "min length {} exceeds max length {}",
                    limits.min_length, limits.max_length
                ),
            });
        }

        let composer = ComposerConfig {
            your_name: get("TRIAGE_YOUR_NAME").unwrap_or(defaults.composer.your_name),
            template: get("TRIAGE_REPLY_TEMPLATE"),
        };

        Ok(Self {
            query: lookup("TRIAGE_QUERY").unwrap_or(defaults.query),
            max_results: parse_or(&get, "TRIAGE_MAX_RESULTS", defaults.max_results)?,
            selection: selection_from(&get)?,
            concurrency: parse_or(&get, "TRIAGE_CONCURRENCY", defaults.concurrency)?.max(1),
            mode,
            max_sentences: parse_or(&get, "TRIAGE_MAX_SENTENCES", defaults.max_sentences)?,
            max_input_tokens: parse_or(&get, "TRIAGE_MAX_INPUT_TOKENS", defaults.max_input_tokens)?,
            limits,
            auto_reply: parse_bool_or(&get, "TRIAGE_AUTO_REPLY", defaults.auto_reply)?,
            dry_run: parse_bool_or(&get, "TRIAGE_DRY_RUN", defaults.dry_run)?,
            min_age: Duration::from_secs(parse_or(
                &get,
                "TRIAGE_MIN_AGE_SECS",
                DEFAULT_MIN_AGE_SECS,
            )?),
            label_name: get("TRIAGE_LABEL_NAME").unwrap_or(defaults.label_name),
            composer,
            model: get("TRIAGE_MODEL").unwrap_or(defaults.model),
            api_key: get("ANTHROPIC_API_KEY").map(SecretString::from),
        })
    }

    /// Policy inputs for the markers resolved against a mailbox.
    pub fn policy_config(
        &self,
        processed_marker: MarkerId,
        owner_sent_marker: MarkerId,
    ) -> PolicyConfig {
        PolicyConfig {
            min_age: self.min_age,
            processed_marker,
            owner_sent_marker,
        }
    }
}

/// At most one of `TRIAGE_TARGET_MS`, `TRIAGE_TARGET_DATETIME` and
/// `TRIAGE_DATE_SUBSTR` may be set.
fn selection_from(get: &impl Fn(&str) -> Option<String>) -> Result<MessageSelector, ConfigError> {
    let tolerance = Duration::from_secs(parse_or(
        get,
        "TRIAGE_TOLERANCE_SECS",
        DEFAULT_TOLERANCE.as_secs(),
    )?);

    let mut selectors = Vec::new();
    if get("TRIAGE_TARGET_MS").is_some() {
        let target_ms: i64 = parse_or(get, "TRIAGE_TARGET_MS", 0)?;
        selectors.push(MessageSelector::Arrival(ArrivalWindow::new(target_ms, tolerance)));
    }
    if let Some(datetime) = get("TRIAGE_TARGET_DATETIME") {
        let format = get("TRIAGE_TARGET_FORMAT").unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string());
        let offset = parse_utc_offset(&get("TRIAGE_TARGET_UTC_OFFSET").unwrap_or_default())?;
        selectors.push(MessageSelector::Arrival(ArrivalWindow::from_local(
            &datetime, &format, offset, tolerance,
        )?));
    }
    if let Some(date) = get("TRIAGE_DATE_SUBSTR") {
        let time = get("TRIAGE_TIME_SUBSTR").unwrap_or_default();
        selectors.push(MessageSelector::DateHeader(DateHeaderMatch::new(date, time)));
    }

    match selectors.len() {
        0 => Ok(MessageSelector::All),
        1 => Ok(selectors.remove(0)),
        _ => Err(ConfigError::InvalidValue {
            key: "TRIAGE_TARGET_MS".into(),
            message: "set only one of TRIAGE_TARGET_MS, TRIAGE_TARGET_DATETIME, TRIAGE_DATE_SUBSTR"
                .into(),
        }),
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        None => Ok(default),
    }
}

fn parse_bool_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}' is not a boolean"),
            }),
        },
        None => Ok(default),
    }
}
