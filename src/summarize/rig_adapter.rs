//! Bounded summarization capability over a rig `CompletionModel`.
//!
//! rig-core handles transport and provider wire formats; this adapter turns
//! a summarization call (text plus a length range) into one completion
//! request and maps rig's errors onto [`SummarizeError`].

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::AssistantContent;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::error::SummarizeError;
use crate::summarize::BoundedSummarizer;

/// Summary lengths are in words; leave room for tokenization overhead.
const TOKENS_PER_WORD: usize = 2;
const MIN_MAX_TOKENS: usize = 64;

/// Provider messages that mean the model will not answer any request.
const UNAVAILABLE_HINTS: &[&str] = &[
    "authentication",
    "permission",
    "invalid x-api-key",
    "not_found",
    "401",
    "403",
];

/// Adapts a rig completion model to [`BoundedSummarizer`].
pub struct RigSummarizer<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigSummarizer<M> {
    pub fn new(model: M, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }
}

/// Claude-backed summarizer.
pub fn anthropic_summarizer(
    api_key: &SecretString,
    model: &str,
) -> Result<Arc<dyn BoundedSummarizer>, SummarizeError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(api_key.expose_secret()).map_err(|e| {
            SummarizeError::CapabilityUnavailable {
                reason: format!("Failed to create Anthropic client: {e}"),
            }
        })?;

    let completion_model = client.completion_model(model);
    info!(model, "Using Anthropic for abstractive summaries");
    Ok(Arc::new(RigSummarizer::new(completion_model, model)))
}

fn system_prompt(min_length: usize, max_length: usize) -> String {
    let length = if min_length == 0 {
        format!("at most {max_length} words")
    } else {
        format!("between {min_length} and {max_length} words")
    };
    format!(
        "You summarize email messages. Summarize the text the user sends in {length} \
         of plain prose. Output only the summary, with no preamble."
    )
}

fn max_tokens(max_length: usize) -> u64 {
    (max_length * TOKENS_PER_WORD).max(MIN_MAX_TOKENS) as u64
}

fn map_error(error: CompletionError) -> SummarizeError {
    match error {
        CompletionError::HttpError(e) => SummarizeError::CapabilityUnavailable {
            reason: e.to_string(),
        },
        CompletionError::ProviderError(message) => {
            let lower = message.to_lowercase();
            if UNAVAILABLE_HINTS.iter().any(|hint| lower.contains(hint)) {
                SummarizeError::CapabilityUnavailable { reason: message }
            } else {
                SummarizeError::RequestFailed { reason: message }
            }
        }
        CompletionError::ResponseError(message) => SummarizeError::InvalidResponse(message),
        other => SummarizeError::RequestFailed {
            reason: other.to_string(),
        },
    }
}

fn join_text_blocks<'a>(blocks: impl IntoIterator<Item = &'a str>) -> Result<String, SummarizeError> {
    let text = blocks
        .into_iter()
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return Err(SummarizeError::InvalidResponse(
            "response contained no text".into(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl<M> BoundedSummarizer for RigSummarizer<M>
where
    M: CompletionModel + 'static,
{
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn summarize(
        &self,
        text: &str,
        min_length: usize,
        max_length: usize,
    ) -> Result<String, SummarizeError> {
        debug!(model = %self.model_name, chars = text.len(), "Requesting summary");

        let response = self
            .model
            .completion_request(text.to_string())
            .preamble(system_prompt(min_length, max_length))
            .temperature(0.0)
            .max_tokens(max_tokens(max_length))
            .send()
            .await
            .map_err(map_error)?;

        join_text_blocks(response.choice.iter().filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_summarizer_constructs_without_network() {
        let summarizer =
            anthropic_summarizer(&SecretString::from("sk-test"), "claude-test").unwrap();
        assert_eq!(summarizer.name(), "claude-test");
    }

    #[test]
    fn prompt_carries_length_bounds() {
        assert!(system_prompt(30, 130).contains("between 30 and 130 words"));
        assert!(system_prompt(0, 20).contains("at most 20 words"));
    }

    #[test]
    fn max_tokens_scales_with_length() {
        assert_eq!(max_tokens(130), 260);
        assert_eq!(max_tokens(20), MIN_MAX_TOKENS as u64);
    }

    #[test]
    fn auth_failures_mean_unavailable() {
        let auth = CompletionError::ProviderError("authentication_error: invalid x-api-key".into());
        assert!(map_error(auth).is_unavailable());

        let busy = CompletionError::ProviderError("overloaded_error".into());
        assert!(matches!(map_error(busy), SummarizeError::RequestFailed { .. }));

        let garbled = CompletionError::ResponseError("missing content".into());
        assert!(matches!(map_error(garbled), SummarizeError::InvalidResponse(_)));
    }

    #[test]
    fn text_blocks_are_joined() {
        assert_eq!(
            join_text_blocks(["  First part.", "", "Second part.  "]).unwrap(),
            "First part.\nSecond part."
        );
        assert!(matches!(
            join_text_blocks(["  "]),
            Err(SummarizeError::InvalidResponse(_))
        ));
    }
}
