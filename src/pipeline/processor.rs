//! Triage processor: summarizes mailbox messages and, when allowed, replies.
//!
//! **Core invariant: never double-reply.** A reply is only sent after the
//! eligibility policy says `eligible` *and* this processor has claimed the
//! message by attaching the processed marker. A concurrent pass that loses
//! the claim skips the message; a failed send leaves the marker in place.
//!
//! A run lists messages with the configured query, keeps those the
//! configured [`MessageSelector`](crate::pipeline::select::MessageSelector)
//! matches (all of them by default), then per message:
//! 1. Normalize body → plain text
//! 2. Summarize (abstractive with extractive fallback, or extractive)
//! 3. Evaluate eligibility against message metadata and thread state
//! 4. Act: summary only, dry-run preview, or claim → send

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::TriageConfig;
use crate::error::{MailboxError, Result};
use crate::mailbox::types::Message;
use crate::mailbox::{MailboxReader, MailboxWriter, MarkerStore};
use crate::normalize::normalize;
use crate::pipeline::compose::{ReplyComposer, reply_envelope};
use crate::pipeline::policy::{EligibilityPolicy, EligibilityVerdict, IneligibleReason};
use crate::pipeline::select::select_messages;
use crate::pipeline::types::{ReplyAction, TriageReport};
use crate::summarize::{Summary, SummaryEngine};

/// Runs triage passes over a mailbox.
pub struct TriageProcessor {
    reader: Arc<dyn MailboxReader>,
    writer: Arc<dyn MailboxWriter>,
    markers: Arc<dyn MarkerStore>,
    engine: SummaryEngine,
    composer: ReplyComposer,
    config: TriageConfig,
}

impl TriageProcessor {
    pub fn new(
        reader: Arc<dyn MailboxReader>,
        writer: Arc<dyn MailboxWriter>,
        markers: Arc<dyn MarkerStore>,
        engine: SummaryEngine,
        config: TriageConfig,
    ) -> Self {
        Self {
            reader,
            writer,
            markers,
            engine,
            composer: ReplyComposer::new(config.composer.clone()),
            config,
        }
    }

    /// Processor over a mailbox that implements all three collaborators.
    pub fn for_mailbox<M>(mailbox: Arc<M>, engine: SummaryEngine, config: TriageConfig) -> Self
    where
        M: MailboxReader + MailboxWriter + MarkerStore + 'static,
    {
        Self::new(mailbox.clone(), mailbox.clone(), mailbox, engine, config)
    }

    /// Resolve the processed marker and build the policy for a pass.
    ///
    /// The owner-sent marker comes from the mailbox, so the policy checks
    /// exactly the marker the mailbox reports on the owner's messages.
    pub async fn prepare_policy(&self) -> std::result::Result<EligibilityPolicy, MailboxError> {
        let marker = self.markers.ensure_marker(&self.config.label_name).await?;
        let sent_marker = self.markers.sent_marker();
        debug!(
            label = %self.config.label_name,
            marker = %marker,
            sent_marker = %sent_marker,
            "Processed marker ready"
        );
        Ok(EligibilityPolicy::new(
            self.config.policy_config(marker, sent_marker),
        ))
    }

    /// Triage every message the configured query and selection yield.
    ///
    /// Messages that fail to load are logged and skipped; only marker
    /// resolution and listing fail the whole run.
    pub async fn run(&self) -> Result<Vec<TriageReport>> {
        let policy = self.prepare_policy().await?;
        let selection = &self.config.selection;
        let messages = select_messages(
            self.reader.as_ref(),
            &self.config.query,
            self.config.max_results,
            selection,
        )
        .await?;

        let count = messages.len();
        info!(
            count,
            query = %self.config.query,
            selection = selection.label(),
            auto_reply = self.config.auto_reply,
            dry_run = self.config.dry_run,
            "Starting triage run"
        );

        let policy = &policy;
        let reports: Vec<TriageReport> = stream::iter(messages)
            .map(|message| async move { self.triage_message(&message, policy).await })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        info!(triaged = reports.len(), "Triage run complete");
        Ok(reports)
    }

    /// Fetch and triage one message.
    pub async fn triage(
        &self,
        id: &str,
        policy: &EligibilityPolicy,
    ) -> std::result::Result<TriageReport, MailboxError> {
        let message = self.reader.get_message(id).await?;
        Ok(self.triage_message(&message, policy).await)
    }

    /// Triage an already fetched message snapshot.
    pub async fn triage_message(
        &self,
        message: &Message,
        policy: &EligibilityPolicy,
    ) -> TriageReport {
        let text = normalize(&message.body);
        let summary = self.engine.summarize(&text).await;
        let verdict = policy.evaluate(message, self.reader.as_ref()).await;
        let action = self.act(message, &summary, verdict, policy).await;

        info!(
            message_id = %message.id,
            method = ?summary.method,
            verdict = verdict.label(),
            action = action.label(),
            "Message triaged"
        );

        TriageReport {
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            from: message.header("from").to_string(),
            subject: message.header("subject").to_string(),
            summary,
            verdict,
            action,
            processed_at: Utc::now(),
        }
    }

    async fn act(
        &self,
        message: &Message,
        summary: &Summary,
        verdict: EligibilityVerdict,
        policy: &EligibilityPolicy,
    ) -> ReplyAction {
        if !self.config.auto_reply {
            return ReplyAction::SummaryOnly;
        }
        if let EligibilityVerdict::Ineligible(reason) = verdict {
            return ReplyAction::Skipped { reason };
        }

        let Some(envelope) = reply_envelope(message) else {
            warn!(message_id = %message.id, "Eligible message has no reply address");
            return ReplyAction::SendFailed {
                reason: "message has no Reply-To or From address".into(),
            };
        };
        if let Err(e) = self.writer.check_recipients(&envelope.to) {
            warn!(message_id = %message.id, to = %envelope.to, error = %e, "Undeliverable reply address");
            return ReplyAction::SendFailed {
                reason: e.to_string(),
            };
        }
        let body = self.composer.compose(message, &summary.text);

        if self.config.dry_run {
            return ReplyAction::WouldSend {
                to: envelope.to,
                subject: envelope.subject,
                body,
            };
        }

        // Claim before sending; only the pass that attaches the marker sends.
        match self
            .writer
            .attach_marker(&message.id, &policy.config().processed_marker)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(message_id = %message.id, "Message already claimed by another pass");
                return ReplyAction::Skipped {
                    reason: IneligibleReason::AlreadyProcessed,
                };
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to claim message");
                return ReplyAction::SendFailed {
                    reason: format!("could not mark message: {e}"),
                };
            }
        }

        match self.writer.send_reply(&envelope, &body).await {
            Ok(sent_id) => {
                info!(message_id = %message.id, sent_id = %sent_id, to = %envelope.to, "Reply sent");
                ReplyAction::Sent { sent_id }
            }
            Err(e) => {
                error!(
                    message_id = %message.id,
                    error = %e,
                    "Reply send failed; message stays marked and will not be retried"
                );
                ReplyAction::SendFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
