//! Frequency-ranked extractive summarizer.
//!
//! Pure and deterministic: sentences are scored by the summed corpus
//! frequency of their non-stopword words, the top `max_sentences` are kept,
//! and the selection is emitted in document order.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Common function words ignored when counting term frequency.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "is", "and", "to", "that", "a", "of", "for", "in", "on", "if", "as", "all", "any",
    "your", "you", "this", "are", "we", "our", "will", "be", "by", "with", "from", "at", "it",
    "has", "have", "an",
];

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Alphabetic}+").expect("valid word regex"));

/// A sentence with its position in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScoredSentence<'a> {
    index: usize,
    text: &'a str,
    score: usize,
}

/// Extractive summarizer with a configurable stopword set.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    stopwords: HashSet<String>,
}

impl ExtractiveSummarizer {
    /// Create a summarizer ignoring `stopwords` (matched lowercased).
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stopwords: stopwords
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Summarize `text` into at most `max_sentences` sentences.
    ///
    /// Empty text or `max_sentences == 0` yields an empty summary.
    pub fn summarize(&self, text: &str, max_sentences: usize) -> String {
        if text.trim().is_empty() || max_sentences == 0 {
            return String::new();
        }

        let sentences = split_sentences(text);
        let freq = self.term_frequencies(text);

        let mut scored: Vec<ScoredSentence<'_>> = sentences
            .into_iter()
            .enumerate()
            .map(|(index, sentence)| ScoredSentence {
                index,
                text: sentence,
                score: words(sentence)
                    .map(|w| freq.get(w.as_str()).copied().unwrap_or(0))
                    .sum(),
            })
            .collect();

        // Stable: equal scores keep document order.
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(max_sentences);
        scored.sort_by_key(|s| s.index);

        scored
            .into_iter()
            .map(|s| s.text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn term_frequencies(&self, text: &str) -> HashMap<String, usize> {
        let mut freq = HashMap::new();
        for word in words(text) {
            if !self.stopwords.contains(&word) {
                *freq.entry(word).or_insert(0) += 1;
            }
        }
        freq
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_STOPWORDS.iter().copied())
    }
}

/// Summarize with the default stopword set.
pub fn summarize_extractive(text: &str, max_sentences: usize) -> String {
    ExtractiveSummarizer::default().summarize(text, max_sentences)
}

/// Split on whitespace that directly follows `.`, `!` or `?`.
///
/// Fragments are trimmed and empty ones dropped; text without terminal
/// punctuation is a single sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;

    for (pos, ch) in text.char_indices() {
        if ch.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            let fragment = text[start..pos].trim();
            if !fragment.is_empty() {
                sentences.push(fragment);
            }
            start = pos;
        }
        prev = Some(ch);
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Lowercased maximal alphabetic runs.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD.find_iter(text).map(|m| m.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty_summary() {
        assert_eq!(summarize_extractive("", 3), "");
        assert_eq!(summarize_extractive("   \n ", 3), "");
    }

    #[test]
    fn zero_sentences_requested_is_empty() {
        assert_eq!(summarize_extractive("One. Two. Three.", 0), "");
    }

    #[test]
    fn picks_highest_frequency_sentence() {
        let text = "A cat sat. A cat ran fast far today. The dog slept.";
        assert_eq!(summarize_extractive(text, 1), "A cat ran fast far today.");
    }

    #[test]
    fn selection_keeps_document_order() {
        let text = "Budget review is friday. Lunch was nice. \
                    The budget review needs the budget numbers. Weather is sunny.";
        let summary = summarize_extractive(text, 2);
        assert_eq!(
            summary,
            "Budget review is friday. The budget review needs the budget numbers."
        );
    }

    #[test]
    fn fewer_sentences_than_requested_returns_all() {
        let text = "First point here. Second point there.";
        assert_eq!(summarize_extractive(text, 10), text);
    }

    #[test]
    fn text_without_terminal_punctuation_is_one_sentence() {
        let text = "no punctuation at all just words";
        assert_eq!(split_sentences(text), vec![text]);
        assert_eq!(summarize_extractive(text, 1), text);
    }

    #[test]
    fn split_requires_whitespace_after_punctuation() {
        assert_eq!(
            split_sentences("Version 1.2 shipped! Really?  Yes.\nDone"),
            vec!["Version 1.2 shipped!", "Really?", "Yes.", "Done"]
        );
    }

    #[test]
    fn ties_keep_original_relative_order() {
        // Every sentence scores 1; the first two win.
        let text = "Alpha. Beta. Gamma.";
        assert_eq!(summarize_extractive(text, 2), "Alpha. Beta.");
    }

    #[test]
    fn summarizing_is_deterministic() {
        let text = "Rust is fast. Rust is safe. Python is popular. Rust compiles code.";
        let first = summarize_extractive(text, 2);
        for _ in 0..5 {
            assert_eq!(summarize_extractive(text, 2), first);
        }
    }

    #[test]
    fn never_returns_more_sentences_than_requested() {
        let text = "One fish. Two fish. Red fish. Blue fish. Old fish. New fish.";
        for n in 1..=4 {
            let summary = summarize_extractive(text, n);
            assert_eq!(split_sentences(&summary).len(), n);
        }
    }

    #[test]
    fn custom_stopwords_change_scoring() {
        let text = "Meeting meeting meeting. Deadline tomorrow.";
        let default = ExtractiveSummarizer::default();
        assert_eq!(default.summarize(text, 1), "Meeting meeting meeting.");

        let custom = ExtractiveSummarizer::new(["meeting"]);
        assert_eq!(custom.summarize(text, 1), "Deadline tomorrow.");
    }

    #[test]
    fn unicode_words_are_counted() {
        let text = "Café opens. Café café serves crêpes.";
        assert_eq!(summarize_extractive(text, 1), "Café café serves crêpes.");
    }
}
