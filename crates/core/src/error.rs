//! Error types for the LexRAG domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; callers map them into their
//! own errors or log them and move on.

use thiserror::Error;

/// Failures of the document-store search backend.
///
/// Inside the orchestrator every variant except [`SearchError::AllSourcesUnavailable`]
/// is a per-branch `SourceUnavailable` condition: it is logged and the branch
/// contributes an empty result.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Backend request failed: {message} (status: {status_code})")]
    Backend { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Search on '{collection}' timed out after {timeout_ms}ms")]
    Timeout { collection: String, timeout_ms: u64 },

    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("All {attempted} search calls failed; last error: {last_error}")]
    AllSourcesUnavailable { attempted: usize, last_error: String },
}

/// Failures of external providers (web search, text generation).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response from provider: {0}")]
    EmptyResponse(String),
}

/// The configured tokenizer could not count a text.
///
/// Never surfaces to callers: the token counter falls back to the
/// whitespace/punctuation heuristic.
#[derive(Debug, Clone, Error)]
pub enum TokenizerError {
    #[error("Tokenizer unavailable: {0}")]
    Unavailable(String),

    #[error("Tokenization failed: {0}")]
    Failed(String),
}
