//! Tokenizer contract used for token-aware chunking, plus a lossless
//! whitespace-piece tokenizer.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SummarizeError;

pub type TokenId = u32;

/// Piece table for one summarization call.
///
/// Tokenizers that intern pieces on the fly keep them here; a tokenizer with
/// a fixed vocabulary leaves it empty. Ids are only meaningful within the
/// vocabulary that produced them.
#[derive(Debug, Default)]
pub struct Vocabulary {
    ids: HashMap<String, TokenId>,
    pieces: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `piece`, interning it on first sight.
    pub fn intern(&mut self, piece: &str) -> Result<TokenId, SummarizeError> {
        if let Some(&id) = self.ids.get(piece) {
            return Ok(id);
        }
        let id = TokenId::try_from(self.pieces.len())
            .map_err(|_| SummarizeError::Tokenizer("vocabulary exhausted".into()))?;
        self.pieces.push(piece.to_string());
        self.ids.insert(piece.to_string(), id);
        Ok(id)
    }

    pub fn piece(&self, id: TokenId) -> Option<&str> {
        self.pieces.get(id as usize).map(String::as_str)
    }

    /// Number of distinct pieces interned.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

/// Tokenizer paired with a bounded summarization capability.
///
/// `decode(encode(text, v), v)` must reproduce `text`. Implementations hold
/// no mutable state; anything learned while encoding goes into the caller's
/// [`Vocabulary`].
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str, vocab: &mut Vocabulary) -> Result<Vec<TokenId>, SummarizeError>;

    fn decode(&self, tokens: &[TokenId], vocab: &Vocabulary) -> Result<String, SummarizeError>;

    /// Maximum number of tokens the paired capability accepts in one call.
    fn max_input_tokens(&self) -> usize;
}

/// A word (with its leading whitespace), or trailing whitespace.
static PIECE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\S+|\s+").expect("valid piece regex"));

/// Tokenizer whose tokens are whitespace-delimited pieces.
///
/// Roughly one token per word, which tracks subword tokenizers closely enough
/// to budget requests when the provider does not expose its own tokenizer.
pub struct WordTokenizer {
    max_input_tokens: usize,
}

impl WordTokenizer {
    pub fn new(max_input_tokens: usize) -> Self {
        Self { max_input_tokens }
    }
}

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str, vocab: &mut Vocabulary) -> Result<Vec<TokenId>, SummarizeError> {
        PIECE
            .find_iter(text)
            .map(|piece| vocab.intern(piece.as_str()))
            .collect()
    }

    fn decode(&self, tokens: &[TokenId], vocab: &Vocabulary) -> Result<String, SummarizeError> {
        let mut text = String::new();
        for &id in tokens {
            let piece = vocab
                .piece(id)
                .ok_or_else(|| SummarizeError::Tokenizer(format!("unknown token id {id}")))?;
            text.push_str(piece);
        }
        Ok(text)
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }
}
