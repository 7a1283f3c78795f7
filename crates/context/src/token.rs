//! Token counting.
//!
//! The primary tokenizer is `cl100k_base` (via `tiktoken-rs`, behind the
//! `tiktoken` feature). When it is unavailable or fails, counting falls
//! back to a deterministic heuristic: whitespace-delimited words plus every
//! character from a fixed punctuation set. The heuristic is approximate;
//! it tends to undercount long Cyrillic words and overcount dense
//! punctuation, but it never depends on external data.

use lexrag_core::TokenizerError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Framing overhead of one chat message (role, delimiters).
pub const MESSAGE_OVERHEAD: usize = 4;

/// Characters the heuristic counts as one token each.
pub const PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\'', '«', '»', '“', '”',
    '-', '–', '—', '/', '\\', '№', '§', '%', '*', '+', '=', '<', '>',
];

/// A pluggable tokenizer.
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &str;

    fn count(&self, text: &str) -> Result<usize, TokenizerError>;
}

/// Whitespace words plus punctuation characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl HeuristicTokenizer {
    pub fn estimate(text: &str) -> usize {
        let words = text.split_whitespace().count();
        let punctuation = text.chars().filter(|c| PUNCTUATION.contains(c)).count();
        words + punctuation
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(Self::estimate(text))
    }
}

/// OpenAI `cl100k_base` BPE.
#[cfg(feature = "tiktoken")]
pub struct TiktokenTokenizer {
    bpe: Arc<tiktoken_rs::CoreBPE>,
}

#[cfg(feature = "tiktoken")]
impl TiktokenTokenizer {
    pub fn cl100k() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| TokenizerError::Unavailable(format!("cl100k_base: {e}")))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

#[cfg(feature = "tiktoken")]
impl Tokenizer for TiktokenTokenizer {
    fn name(&self) -> &str {
        "cl100k_base"
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.bpe.encode_ordinary(text).len())
    }
}

/// Counts tokens with a primary tokenizer, falling back to the heuristic.
#[derive(Clone)]
pub struct TokenCounter {
    primary: Option<Arc<dyn Tokenizer>>,
}

impl TokenCounter {
    /// Heuristic counting only.
    pub fn heuristic() -> Self {
        Self { primary: None }
    }

    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            primary: Some(tokenizer),
        }
    }

    /// `cl100k_base` if it can be loaded, otherwise the heuristic.
    pub fn cl100k() -> Self {
        #[cfg(feature = "tiktoken")]
        {
            match TiktokenTokenizer::cl100k() {
                Ok(t) => Self::with_tokenizer(Arc::new(t)),
                Err(e) => {
                    warn!(error = %e, "Tokenizer unavailable, using heuristic token counts");
                    Self::heuristic()
                }
            }
        }
        #[cfg(not(feature = "tiktoken"))]
        {
            warn!("Built without the tiktoken feature, using heuristic token counts");
            Self::heuristic()
        }
    }

    /// Build from a configured name: `cl100k_base` or `heuristic`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "heuristic" => Self::heuristic(),
            _ => Self::cl100k(),
        }
    }

    pub fn name(&self) -> &str {
        self.primary.as_ref().map_or("heuristic", |t| t.name())
    }

    /// Tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.primary {
            Some(t) => t.count(text).unwrap_or_else(|e| {
                debug!(tokenizer = t.name(), error = %e, "Tokenizer failed, using heuristic");
                HeuristicTokenizer::estimate(text)
            }),
            None => HeuristicTokenizer::estimate(text),
        }
    }

    /// Tokens for one message including framing overhead.
    pub fn count_message(&self, content: &str) -> usize {
        MESSAGE_OVERHEAD + self.count(content)
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("tokenizer", &self.name())
            .finish()
    }
}
