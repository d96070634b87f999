//! Shared types for the triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mailbox::types::SentId;
use crate::pipeline::policy::{EligibilityVerdict, IneligibleReason};
use crate::summarize::Summary;

// ── Reply action ────────────────────────────────────────────────────

/// What the processor did about replying to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplyAction {
    /// Auto-reply is off; the message was only summarized.
    SummaryOnly,
    /// The policy (or a concurrent claim) ruled out a reply.
    Skipped { reason: IneligibleReason },
    /// Dry run: the reply that would have been sent.
    WouldSend {
        to: String,
        subject: String,
        body: String,
    },
    /// Reply sent and message marked.
    Sent { sent_id: SentId },
    /// Eligible, but the reply could not be sent.
    SendFailed { reason: String },
}

impl ReplyAction {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SummaryOnly => "summary_only",
            Self::Skipped { .. } => "skipped",
            Self::WouldSend { .. } => "would_send",
            Self::Sent { .. } => "sent",
            Self::SendFailed { .. } => "send_failed",
        }
    }
}

// ── Triage report ───────────────────────────────────────────────────

/// Outcome of one triage pass over a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageReport {
    pub message_id: String,
    pub thread_id: String,
    /// `From` header as received.
    pub from: String,
    pub subject: String,
    pub summary: Summary,
    pub verdict: EligibilityVerdict,
    pub action: ReplyAction,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_with_tag() {
        let json = serde_json::to_value(ReplyAction::Skipped {
            reason: IneligibleReason::AutomatedSender,
        })
        .unwrap();
        assert_eq!(json["action"], "skipped");
        assert_eq!(json["reason"], "automated_sender");

        let json = serde_json::to_value(ReplyAction::Sent {
            sent_id: "sent-1".into(),
        })
        .unwrap();
        assert_eq!(json["action"], "sent");
        assert_eq!(json["sent_id"], "sent-1");
    }

    #[test]
    fn action_deserializes() {
        let action: ReplyAction =
            serde_json::from_str(r#"{"action": "send_failed", "reason": "smtp down"}"#).unwrap();
        assert_eq!(
            action,
            ReplyAction::SendFailed {
                reason: "smtp down".into()
            }
        );
        assert_eq!(action.label(), "send_failed");
    }
}
