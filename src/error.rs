//! Error types for inbox triage.

use std::time::Duration;

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors surfaced by mailbox collaborators (reader, writer, marker store).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Failed to parse message {id}: {reason}")]
    Parse { id: String, reason: String },

    #[error("Failed to send reply: {reason}")]
    Send { reason: String },

    #[error("Mailbox state error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the tokenizer or the bounded summarization capability.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    /// The capability cannot be used at all; callers fall back to extractive.
    #[error("Summarization capability unavailable: {reason}")]
    CapabilityUnavailable { reason: String },

    #[error("Summarization request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Summarization timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Invalid summarization response: {0}")]
    InvalidResponse(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

impl SummarizeError {
    /// Whether this error means no further calls are worth attempting.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable { .. })
    }
}

/// Result type alias for triage operations.
pub type Result<T> = std::result::Result<T, Error>;
