//! Summarization: extractive (always available) and chunked abstractive
//! (over an external bounded capability), behind one `SummaryEngine`.

pub mod chunked;
pub mod extractive;
pub mod rig_adapter;
pub mod tokenizer;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{SummaryMode, TriageConfig};
use crate::error::SummarizeError;

pub use chunked::{ChunkedSummarizer, plan_windows};
pub use extractive::{ExtractiveSummarizer, summarize_extractive};
pub use rig_adapter::{RigSummarizer, anthropic_summarizer};
pub use tokenizer::{TokenId, Tokenizer, Vocabulary, WordTokenizer};

/// A summarization model that accepts input up to a known token budget.
#[async_trait]
pub trait BoundedSummarizer: Send + Sync {
    /// Capability name for logging.
    fn name(&self) -> &str;

    /// Summarize `text` to between `min_length` and `max_length` (model units).
    async fn summarize(
        &self,
        text: &str,
        min_length: usize,
        max_length: usize,
    ) -> Result<String, SummarizeError>;
}

/// How a summary was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMethod {
    Extractive,
    Abstractive,
    /// Abstractive was configured but failed; extractive was used instead.
    ExtractiveFallback,
}

/// Summary text plus the method that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub method: SummaryMethod,
}

/// Picks the configured summarizer and falls back to extractive when the
/// abstractive path fails, so a pass always yields a summary.
pub struct SummaryEngine {
    extractive: ExtractiveSummarizer,
    max_sentences: usize,
    abstractive: Option<ChunkedSummarizer>,
}

impl SummaryEngine {
    /// Extractive-only engine.
    pub fn extractive(extractive: ExtractiveSummarizer, max_sentences: usize) -> Self {
        Self {
            extractive,
            max_sentences,
            abstractive: None,
        }
    }

    /// Engine for the configured mode.
    ///
    /// Abstractive mode needs an API key; without one the engine runs
    /// extractive only.
    pub fn from_config(config: &TriageConfig) -> Self {
        let engine = Self::extractive(ExtractiveSummarizer::default(), config.max_sentences);
        if config.mode != SummaryMode::Abstractive {
            return engine;
        }
        let Some(api_key) = config.api_key.clone() else {
            warn!("Abstractive mode requested but ANTHROPIC_API_KEY is not set, using extractive");
            return engine;
        };

        let capability = match anthropic_summarizer(&api_key, &config.model) {
            Ok(capability) => capability,
            Err(e) => {
                warn!(error = %e, "Abstractive summarizer unavailable, using extractive");
                return engine;
            }
        };
        debug!(model = %config.model, budget = config.max_input_tokens, "Abstractive summarizer ready");
        engine.with_abstractive(ChunkedSummarizer::new(
            capability,
            Arc::new(WordTokenizer::new(config.max_input_tokens)),
            config.limits.clone(),
        ))
    }

    pub fn is_abstractive(&self) -> bool {
        self.abstractive.is_some()
    }

    /// Prefer `chunked` and keep extractive as the fallback.
    pub fn with_abstractive(mut self, chunked: ChunkedSummarizer) -> Self {
        self.abstractive = Some(chunked);
        self
    }

    pub async fn summarize(&self, text: &str) -> Summary {
        let Some(abstractive) = &self.abstractive else {
            return Summary {
                text: self.extractive.summarize(text, self.max_sentences),
                method: SummaryMethod::Extractive,
            };
        };

        match abstractive.summarize(text).await {
            Ok(summary) => Summary {
                text: summary,
                method: SummaryMethod::Abstractive,
            },
            Err(e) => {
                warn!(error = %e, "Abstractive summarization failed, using extractive");
                let text = self.extractive.summarize(text, self.max_sentences);
                debug!(chars = text.len(), "Extractive fallback summary ready");
                Summary {
                    text,
                    method: SummaryMethod::ExtractiveFallback,
                }
            }
        }
    }
}
