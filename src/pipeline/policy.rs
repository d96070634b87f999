//! Reply eligibility policy.
//!
//! Decides whether a message may receive an automated reply. Checks run in a
//! fixed order and the first one that triggers is the reported reason:
//! 1. Already processed: message carries the de-duplication marker
//! 2. Automated sender: ordered header rules, first match wins
//! 3. Thread already replied: the owner sent something in the thread
//! 4. Too new: younger than the minimum age, or arrival time unknown
//!
//! The policy never fails: a collaborator error resolves to ineligible.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PolicyConfig;
use crate::mailbox::MailboxReader;
use crate::mailbox::types::{MarkerId, Message};

// ── Verdict ─────────────────────────────────────────────────────────

/// Why a message may not be auto-replied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    AlreadyProcessed,
    AutomatedSender,
    ThreadAlreadyReplied,
    TooNew,
}

impl IneligibleReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyProcessed => "already_processed",
            Self::AutomatedSender => "automated_sender",
            Self::ThreadAlreadyReplied => "thread_already_replied",
            Self::TooNew => "too_new",
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of evaluating the policy for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum EligibilityVerdict {
    Eligible,
    Ineligible(IneligibleReason),
}

impl EligibilityVerdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::Ineligible(reason) => reason.label(),
        }
    }
}

// ── Automation rules ────────────────────────────────────────────────

/// What an automation rule inspects.
#[derive(Debug, Clone)]
pub enum RuleCheck {
    /// The header is present (any value).
    HeaderPresent(String),
    /// The lowercased header value contains any of the needles.
    HeaderContains { header: String, needles: Vec<String> },
    /// The bare, lowercased sender address matches the regex.
    SenderMatches(Regex),
    /// The header's primary value (before any `;`) equals one of the values.
    HeaderIn { header: String, values: Vec<String> },
}

/// A single automated-sender heuristic.
#[derive(Debug, Clone)]
pub struct AutomationRule {
    /// Rule name for logging.
    pub name: String,
    pub check: RuleCheck,
}

impl AutomationRule {
    pub fn new(name: impl Into<String>, check: RuleCheck) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        match &self.check {
            RuleCheck::HeaderPresent(header) => message.headers.contains(header),
            RuleCheck::HeaderContains { header, needles } => {
                let value = message.header(header).to_lowercase();
                needles.iter().any(|n| value.contains(n.as_str()))
            }
            RuleCheck::SenderMatches(regex) => regex.is_match(&message.sender_address()),
            RuleCheck::HeaderIn { header, values } => {
                let value = message.header(header);
                let primary = value.split(';').next().unwrap_or("").trim();
                !primary.is_empty() && values.iter().any(|v| v.eq_ignore_ascii_case(primary))
            }
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Built-in automated-sender rules, in priority order.
pub fn default_automation_rules() -> Vec<AutomationRule> {
    vec![
        AutomationRule::new("mailing_list", RuleCheck::HeaderPresent("list-id".into())),
        AutomationRule::new(
            "automated_sender_address",
            RuleCheck::HeaderContains {
                header: "from".into(),
                needles: strings(&["mailer-daemon", "no-reply", "noreply"]),
            },
        ),
        AutomationRule::new(
            "do_not_reply_address",
            RuleCheck::SenderMatches(
                Regex::new(r"^(no-?reply|donotreply|do-?not-?reply)")
                    .expect("valid do-not-reply regex"),
            ),
        ),
        AutomationRule::new(
            "auto_submitted",
            RuleCheck::HeaderIn {
                header: "auto-submitted".into(),
                values: strings(&["auto-generated", "auto-replied", "auto-notified", "yes"]),
            },
        ),
        AutomationRule::new(
            "bulk_precedence",
            RuleCheck::HeaderIn {
                header: "precedence".into(),
                values: strings(&["bulk", "list", "auto_reply"]),
            },
        ),
    ]
}

// ── Policy ──────────────────────────────────────────────────────────

/// Reply eligibility policy.
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    config: PolicyConfig,
    automation_rules: Vec<AutomationRule>,
}

impl EligibilityPolicy {
    /// Policy with the default automation rules.
    pub fn new(config: PolicyConfig) -> Self {
        Self::with_rules(config, default_automation_rules())
    }

    pub fn with_rules(config: PolicyConfig, automation_rules: Vec<AutomationRule>) -> Self {
        Self {
            config,
            automation_rules,
        }
    }

    /// Append a lower-priority automation rule.
    pub fn add_rule(&mut self, rule: AutomationRule) {
        self.automation_rules.push(rule);
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// First automation rule matching the message, if any.
    pub fn automation_match(&self, message: &Message) -> Option<&AutomationRule> {
        self.automation_rules.iter().find(|r| r.matches(message))
    }

    /// Evaluate at the current time.
    pub async fn evaluate(
        &self,
        message: &Message,
        reader: &dyn MailboxReader,
    ) -> EligibilityVerdict {
        self.evaluate_at(message, reader, Utc::now()).await
    }

    /// Evaluate as of `now`.
    pub async fn evaluate_at(
        &self,
        message: &Message,
        reader: &dyn MailboxReader,
        now: DateTime<Utc>,
    ) -> EligibilityVerdict {
        let verdict = self.check(message, reader, now).await;
        debug!(
            message_id = %message.id,
            thread_id = %message.thread_id,
            verdict = verdict.label(),
            "Eligibility evaluated"
        );
        verdict
    }

    async fn check(
        &self,
        message: &Message,
        reader: &dyn MailboxReader,
        now: DateTime<Utc>,
    ) -> EligibilityVerdict {
        use IneligibleReason::*;

        if message.has_marker(&self.config.processed_marker) {
            return EligibilityVerdict::Ineligible(AlreadyProcessed);
        }

        if let Some(rule) = self.automation_match(message) {
            debug!(message_id = %message.id, rule = %rule.name, "Automated sender rule matched");
            return EligibilityVerdict::Ineligible(AutomatedSender);
        }

        match reader.thread_markers(&message.thread_id).await {
            Ok(markers) => {
                if self.owner_replied(message, &markers) {
                    return EligibilityVerdict::Ineligible(ThreadAlreadyReplied);
                }
            }
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    thread_id = %message.thread_id,
                    error = %e,
                    "Thread lookup failed, treating thread as already replied"
                );
                return EligibilityVerdict::Ineligible(ThreadAlreadyReplied);
            }
        }

        if self.is_too_new(message, now) {
            return EligibilityVerdict::Ineligible(TooNew);
        }

        EligibilityVerdict::Eligible
    }

    fn owner_replied(&self, message: &Message, thread_markers: &BTreeSet<MarkerId>) -> bool {
        let sent = &self.config.owner_sent_marker;
        thread_markers.contains(sent) || message.has_marker(sent)
    }

    /// Unknown arrival time counts as too new.
    fn is_too_new(&self, message: &Message, now: DateTime<Utc>) -> bool {
        let Some(arrived) = message.arrived_at() else {
            return true;
        };
        let min_age = TimeDelta::from_std(self.config.min_age).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(arrived) < min_age
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mailbox::InMemoryMailbox;
    use crate::mailbox::types::SENT_MARKER;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    fn hours_ago(hours: i64) -> i64 {
        now().timestamp_millis() - hours * HOUR_MS
    }

    fn policy() -> EligibilityPolicy {
        EligibilityPolicy::new(PolicyConfig::new(
            MarkerId::from("Label_1"),
            Duration::from_secs(6 * 60 * 60),
        ))
    }

    fn human(id: &str, thread: &str) -> Message {
        Message::new(id, thread)
            .with_header("From", "Alice Smith <alice@example.com>")
            .with_header("Subject", "Lunch?")
            .with_internal_date(hours_ago(24))
    }

    async fn verdict(message: Message, mailbox: &InMemoryMailbox) -> EligibilityVerdict {
        mailbox.insert(message.clone()).unwrap();
        policy().evaluate_at(&message, mailbox, now()).await
    }

    fn ineligible(reason: IneligibleReason) -> EligibilityVerdict {
        EligibilityVerdict::Ineligible(reason)
    }

    #[tokio::test]
    async fn old_human_message_is_eligible() {
        let mb = InMemoryMailbox::new();
        assert_eq!(verdict(human("m1", "t1"), &mb).await, EligibilityVerdict::Eligible);
    }

    #[tokio::test]
    async fn processed_marker_wins_over_everything() {
        let mb = InMemoryMailbox::new();
        let msg = Message::new("m1", "t1")
            .with_header("From", "no-reply@example.com")
            .with_header("List-Id", "<news.example.com>")
            .with_marker("Label_1")
            .with_marker(SENT_MARKER)
            .with_internal_date(now().timestamp_millis());
        assert_eq!(verdict(msg, &mb).await, ineligible(IneligibleReason::AlreadyProcessed));
    }

    #[tokio::test]
    async fn automated_sender_beats_too_new() {
        let mb = InMemoryMailbox::new();
        let msg = Message::new("m1", "t1")
            .with_header("From", "no-reply@example.com")
            .with_internal_date(now().timestamp_millis() - 1_000);
        assert_eq!(verdict(msg, &mb).await, ineligible(IneligibleReason::AutomatedSender));
    }

    #[tokio::test]
    async fn automated_sender_beats_thread_replied() {
        let mb = InMemoryMailbox::new();
        mb.insert(Message::new("mine", "t1").with_marker(SENT_MARKER)).unwrap();
        let msg = human("m1", "t1").with_header("Precedence", "bulk");
        assert_eq!(verdict(msg, &mb).await, ineligible(IneligibleReason::AutomatedSender));
    }

    #[tokio::test]
    async fn owner_reply_in_thread_blocks_human_message() {
        let mb = InMemoryMailbox::new();
        mb.insert(Message::new("mine", "t1").with_marker(SENT_MARKER)).unwrap();
        assert_eq!(
            verdict(human("m1", "t1"), &mb).await,
            ineligible(IneligibleReason::ThreadAlreadyReplied)
        );
        // Other threads are unaffected.
        assert_eq!(verdict(human("m2", "t2"), &mb).await, EligibilityVerdict::Eligible);
    }

    #[tokio::test]
    async fn thread_lookup_failure_fails_closed() {
        let mb = InMemoryMailbox::new();
        mb.set_thread_lookup_failure(true);
        assert_eq!(
            verdict(human("m1", "t1"), &mb).await,
            ineligible(IneligibleReason::ThreadAlreadyReplied)
        );
    }

    #[tokio::test]
    async fn young_message_is_too_new() {
        let mb = InMemoryMailbox::new();
        let msg = human("m1", "t1").with_internal_date(hours_ago(1));
        assert_eq!(verdict(msg, &mb).await, ineligible(IneligibleReason::TooNew));
    }

    #[tokio::test]
    async fn exactly_min_age_is_old_enough() {
        let mb = InMemoryMailbox::new();
        let msg = human("m1", "t1").with_internal_date(hours_ago(6));
        assert_eq!(verdict(msg, &mb).await, EligibilityVerdict::Eligible);
    }

    #[tokio::test]
    async fn missing_or_zero_arrival_time_is_too_new() {
        let mb = InMemoryMailbox::new();
        let mut missing = human("m1", "t1");
        missing.internal_date = None;
        assert_eq!(verdict(missing, &mb).await, ineligible(IneligibleReason::TooNew));

        let zero = human("m2", "t2").with_internal_date(0);
        assert_eq!(verdict(zero, &mb).await, ineligible(IneligibleReason::TooNew));
    }

    #[tokio::test]
    async fn future_dated_message_is_too_new() {
        let mb = InMemoryMailbox::new();
        let msg = human("m1", "t1").with_internal_date(now().timestamp_millis() + HOUR_MS);
        assert_eq!(verdict(msg, &mb).await, ineligible(IneligibleReason::TooNew));
    }

    // ── automation rules ────────────────────────────────────────────

    fn rule_for(message: &Message) -> Option<String> {
        policy().automation_match(message).map(|r| r.name.clone())
    }

    #[test]
    fn each_automation_rule_fires() {
        let base = || Message::new("m", "t").with_header("From", "Bob <bob@example.com>");
        let cases = [
            (base().with_header("List-Id", "<dev.example.com>"), "mailing_list"),
            (
                Message::new("m", "t").with_header("From", "MAILER-DAEMON@mx.example.com"),
                "automated_sender_address",
            ),
            (
                Message::new("m", "t").with_header("From", "Shop <noreply@shop.example>"),
                "automated_sender_address",
            ),
            (
                Message::new("m", "t").with_header("From", "Bank <DoNotReply@bank.example>"),
                "do_not_reply_address",
            ),
            (
                Message::new("m", "t").with_header("From", "do-not-reply@svc.example"),
                "do_not_reply_address",
            ),
            (
                base().with_header("Auto-Submitted", "auto-replied; owner-email=x"),
                "auto_submitted",
            ),
            (base().with_header("Precedence", "List"), "bulk_precedence"),
            (base().with_header("Precedence", "auto_reply"), "bulk_precedence"),
        ];
        for (message, expected) in cases {
            assert_eq!(rule_for(&message).as_deref(), Some(expected), "{message:?}");
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let msg = Message::new("m", "t")
            .with_header("From", "noreply@example.com")
            .with_header("List-Id", "<x>")
            .with_header("Precedence", "bulk");
        assert_eq!(rule_for(&msg).as_deref(), Some("mailing_list"));
    }

    #[test]
    fn human_headers_match_no_rule() {
        let msg = Message::new("m", "t")
            .with_header("From", "Replyable Person <reply@example.com>")
            .with_header("Auto-Submitted", "no")
            .with_header("Precedence", "first-class");
        assert_eq!(rule_for(&msg), None);
    }

    #[test]
    fn custom_rule_is_checked_after_defaults() {
        let mut policy = policy();
        policy.add_rule(AutomationRule::new(
            "github",
            RuleCheck::SenderMatches(Regex::new(r"^notifications@github\.com$").unwrap()),
        ));
        let msg = Message::new("m", "t").with_header("From", "GitHub <notifications@github.com>");
        assert_eq!(policy.automation_match(&msg).map(|r| r.name.as_str()), Some("github"));
    }

    #[test]
    fn verdict_serialization() {
        let json = serde_json::to_value(ineligible(IneligibleReason::TooNew)).unwrap();
        assert_eq!(json["verdict"], "ineligible");
        assert_eq!(json["reason"], "too_new");
        let json = serde_json::to_value(EligibilityVerdict::Eligible).unwrap();
        assert_eq!(json["verdict"], "eligible");
    }
}
