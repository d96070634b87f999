//! Reply composer: renders a summary into a reply body and derives the reply
//! envelope from the original message's headers.

use crate::config::ComposerConfig;
use crate::mailbox::ReplyEnvelope;
use crate::mailbox::types::Message;

const DEFAULT_TEMPLATE: &str = "Hello,\n\n\
Thank you for your message (re: {subject}). Here is a brief summary of what I understand:\n\n\
{summary}\n\n\
I will follow up with more details as required.\n\n\
Best regards,\n\
{name}";

/// Renders reply bodies.
#[derive(Debug, Clone, Default)]
pub struct ReplyComposer {
    config: ComposerConfig,
}

impl ReplyComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    /// Reply body for `message` carrying `summary`.
    ///
    /// A custom template without a `{summary}` placeholder gets the summary
    /// appended after a blank line.
    pub fn compose(&self, message: &Message, summary: &str) -> String {
        let subject = message.header("subject").trim();
        match &self.config.template {
            Some(template) => {
                let rendered = render(template, &[("subject", subject), ("summary", summary)]);
                if template.contains("{summary}") {
                    rendered
                } else {
                    format!("{rendered}\n\n{summary}")
                }
            }
            None => render(
                DEFAULT_TEMPLATE,
                &[
                    ("subject", subject),
                    ("summary", summary),
                    ("name", &self.config.your_name),
                ],
            ),
        }
    }
}

/// Single-pass placeholder substitution. Values are never re-scanned, and
/// unknown placeholders are left as written.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `Re: ` prefixed subject, unless it already reads as a reply.
pub fn reply_subject(subject: &str) -> String {
    let subject = subject.trim();
    let is_reply = subject
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if is_reply {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Envelope for replying to `message` in its thread.
///
/// Returns `None` when the message has neither `Reply-To` nor `From`.
pub fn reply_envelope(message: &Message) -> Option<ReplyEnvelope> {
    let to = [message.header("reply-to"), message.header("from")]
        .into_iter()
        .map(str::trim)
        .find(|v| !v.is_empty())?;

    let message_id = message.header("message-id").trim();
    let references = message.header("references").trim();
    let references = match (references.is_empty(), message_id.is_empty()) {
        (true, true) => None,
        (false, true) => Some(references.to_string()),
        (true, false) => Some(message_id.to_string()),
        (false, false) => Some(format!("{references} {message_id}")),
    };

    Some(ReplyEnvelope {
        thread_id: message.thread_id.clone(),
        to: to.to_string(),
        subject: reply_subject(message.header("subject")),
        in_reply_to: (!message_id.is_empty()).then(|| message_id.to_string()),
        references,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new("m1", "t1")
            .with_header("From", "Alice <alice@example.com>")
            .with_header("Subject", "Quarterly report")
            .with_header("Message-ID", "<m1@example.com>")
    }

    #[test]
    fn default_template() {
        let composer = ReplyComposer::new(ComposerConfig {
            your_name: "Sam".into(),
            template: None,
        });
        let body = composer.compose(&message(), "Numbers are up.");
        assert_eq!(
            body,
            "Hello,\n\nThank you for your message (re: Quarterly report). \
             Here is a brief summary of what I understand:\n\nNumbers are up.\n\n\
             I will follow up with more details as required.\n\nBest regards,\nSam"
        );
    }

    #[test]
    fn custom_template_substitutes_placeholders() {
        let composer = ReplyComposer::new(ComposerConfig {
            your_name: "Sam".into(),
            template: Some("About {subject}: {summary} {unknown}".into()),
        });
        assert_eq!(
            composer.compose(&message(), "short"),
            "About Quarterly report: short {unknown}"
        );
    }

    #[test]
    fn custom_template_without_placeholder_appends_summary() {
        let composer = ReplyComposer::new(ComposerConfig {
            your_name: "Sam".into(),
            template: Some("Thanks, got it.".into()),
        });
        assert_eq!(
            composer.compose(&message(), "The gist."),
            "Thanks, got it.\n\nThe gist."
        );
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let composer = ReplyComposer::new(ComposerConfig {
            your_name: "Sam".into(),
            template: Some("{summary}|{subject}".into()),
        });
        let msg = message().with_header("Subject", "{summary}");
        assert_eq!(composer.compose(&msg, "{subject}"), "{subject}|{summary}");
    }

    #[test]
    fn subject_prefix() {
        assert_eq!(reply_subject("Hello"), "Re: Hello");
        assert_eq!(reply_subject("RE: Hello"), "RE: Hello");
        assert_eq!(reply_subject("re:Hello"), "re:Hello");
        assert_eq!(reply_subject("Regarding"), "Re: Regarding");
        assert_eq!(reply_subject(""), "Re: ");
        assert_eq!(reply_subject("é"), "Re: é");
    }

    #[test]
    fn envelope_prefers_reply_to_and_chains_references() {
        let msg = message()
            .with_header("Reply-To", "team@example.com")
            .with_header("References", "<a@x> <b@x>");
        let env = reply_envelope(&msg).unwrap();
        assert_eq!(env.thread_id, "t1");
        assert_eq!(env.to, "team@example.com");
        assert_eq!(env.subject, "Re: Quarterly report");
        assert_eq!(env.in_reply_to.as_deref(), Some("<m1@example.com>"));
        assert_eq!(env.references.as_deref(), Some("<a@x> <b@x> <m1@example.com>"));
    }

    #[test]
    fn envelope_without_ids_or_recipient() {
        let msg = Message::new("m1", "t1").with_header("From", "bob@example.com");
        let env = reply_envelope(&msg).unwrap();
        assert_eq!(env.to, "bob@example.com");
        assert_eq!(env.in_reply_to, None);
        assert_eq!(env.references, None);

        assert!(reply_envelope(&Message::new("m2", "t2")).is_none());
    }
}
