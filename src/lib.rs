//! Inbox triage: message summarization and safe, idempotent auto-replies.

pub mod config;
pub mod error;
pub mod logging;
pub mod mailbox;
pub mod normalize;
pub mod pipeline;
pub mod summarize;
