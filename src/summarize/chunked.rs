//! Token-aware chunked summarization over a length-bounded capability.
//!
//! Long inputs are split into overlapping token windows, each window is
//! summarized independently (map), and multiple chunk summaries are combined
//! and summarized once more (reduce).

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::SummaryLimits;
use crate::error::SummarizeError;
use crate::summarize::BoundedSummarizer;
use crate::summarize::tokenizer::{Tokenizer, Vocabulary};

/// Lower bound for the degraded max length, when the configured max allows it.
const FALLBACK_MAX_LENGTH_FLOOR: usize = 60;

/// Separator placed between chunk summaries before the reduce pass.
const CHUNK_SUMMARY_SEPARATOR: &str = " ";

/// Plan sliding windows of `window` tokens over `total` tokens.
///
/// Consecutive windows share `overlap` tokens (clamped to half a window so
/// every step advances). The last window ends exactly at `total`.
pub fn plan_windows(total: usize, window: usize, overlap: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let window = window.max(1);
    let overlap = overlap.min(window / 2);

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + window).min(total);
        windows.push(start..end);
        if end == total {
            break;
        }
        start = end - overlap;
    }
    windows
}

/// Shorter max length used when a call at the configured limits fails.
fn fallback_max_length(max_length: usize) -> usize {
    (max_length / 2)
        .max(FALLBACK_MAX_LENGTH_FLOOR)
        .min(max_length.saturating_sub(1))
        .max(1)
}

/// Chunked abstractive summarizer.
pub struct ChunkedSummarizer {
    capability: Arc<dyn BoundedSummarizer>,
    tokenizer: Arc<dyn Tokenizer>,
    limits: SummaryLimits,
}

impl ChunkedSummarizer {
    pub fn new(
        capability: Arc<dyn BoundedSummarizer>,
        tokenizer: Arc<dyn Tokenizer>,
        limits: SummaryLimits,
    ) -> Self {
        Self {
            capability,
            tokenizer,
            limits,
        }
    }

    /// Tokens available per call after the safety margin.
    pub fn effective_budget(&self) -> usize {
        self.tokenizer
            .max_input_tokens()
            .saturating_sub(self.limits.safety_margin)
            .max(1)
    }

    /// Summarize text of any length.
    ///
    /// Fails with `CapabilityUnavailable` when the capability (or tokenizer)
    /// cannot be used at all; individual chunk failures only drop that chunk.
    pub async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let budget = self.effective_budget();
        let mut vocab = Vocabulary::new();
        let tokens = self
            .tokenizer
            .encode(text, &mut vocab)
            .map_err(unavailable)?;

        if tokens.len() <= budget {
            debug!(tokens = tokens.len(), budget, "Input fits in one call");
            return self.summarize_with_fallback(text.trim(), None).await;
        }

        let windows = plan_windows(tokens.len(), budget, self.limits.overlap_tokens);
        info!(
            tokens = tokens.len(),
            budget,
            chunks = windows.len(),
            "Summarizing in chunks"
        );

        let mut chunk_summaries = Vec::with_capacity(windows.len());
        for (index, window) in windows.into_iter().enumerate() {
            let chunk_text = self
                .tokenizer
                .decode(&tokens[window], &vocab)
                .map_err(unavailable)?;
            match self
                .summarize_with_fallback(chunk_text.trim(), Some(index))
                .await
            {
                Ok(summary) => chunk_summaries.push(summary),
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => warn!(chunk = index, error = %e, "Chunk summarization failed, skipping"),
            }
        }

        match chunk_summaries.len() {
            0 => Err(SummarizeError::CapabilityUnavailable {
                reason: "every chunk failed to summarize".into(),
            }),
            1 => Ok(chunk_summaries.remove(0)),
            _ => self.reduce(&chunk_summaries, budget).await,
        }
    }

    /// Combine chunk summaries and run one final pass over them.
    async fn reduce(&self, chunk_summaries: &[String], budget: usize) -> Result<String, SummarizeError> {
        let mut combined = chunk_summaries.join(CHUNK_SUMMARY_SEPARATOR);
        let mut vocab = Vocabulary::new();
        let combined_tokens = self
            .tokenizer
            .encode(&combined, &mut vocab)
            .map_err(unavailable)?;
        if combined_tokens.len() > budget {
            debug!(
                tokens = combined_tokens.len(),
                budget, "Truncating combined chunk summaries"
            );
            combined = self
                .tokenizer
                .decode(&combined_tokens[..budget], &vocab)
                .map_err(unavailable)?;
        }

        match self.summarize_with_fallback(combined.trim(), None).await {
            Ok(summary) => Ok(summary),
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                warn!(error = %e, "Final summarization pass failed, returning combined chunk summaries");
                Ok(combined.trim().to_string())
            }
        }
    }

    /// One call at the configured limits, retried once with a shorter target
    /// and no minimum.
    async fn summarize_with_fallback(
        &self,
        text: &str,
        chunk: Option<usize>,
    ) -> Result<String, SummarizeError> {
        let max_length = self.limits.max_length;
        match self.call(text, self.limits.min_length, max_length).await {
            Ok(summary) => Ok(summary),
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                let fallback_max = fallback_max_length(max_length);
                warn!(
                    chunk = ?chunk,
                    error = %e,
                    fallback_max,
                    "Summarization failed, retrying with shorter target"
                );
                self.call(text, 0, fallback_max).await
            }
        }
    }

    async fn call(
        &self,
        text: &str,
        min_length: usize,
        max_length: usize,
    ) -> Result<String, SummarizeError> {
        let request = self.capability.summarize(text, min_length, max_length);
        match self.limits.chunk_timeout {
            Some(after) => tokio::time::timeout(after, request)
                .await
                .map_err(|_| SummarizeError::Timeout { after })?,
            None => request.await,
        }
    }
}

fn unavailable(e: SummarizeError) -> SummarizeError {
    match e {
        SummarizeError::CapabilityUnavailable { .. } => e,
        other => SummarizeError::CapabilityUnavailable {
            reason: other.to_string(),
        },
    }
}
