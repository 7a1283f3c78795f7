//! Search result domain types.
//!
//! Every backend hit and every web-search hit is normalized at the boundary
//! into a [`SearchResult`]. Identity is provenance-dependent: internal
//! results are keyed by `(collection_id, document_id, chunk_id)`, external
//! ones by URL. A [`ResultSet`] never holds two results with the same key.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Internal legal indices.
    Internal,
    /// External web search.
    External,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Provenance-specific origin of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provenance", rename_all = "lowercase")]
pub enum Source {
    Internal {
        collection_id: String,
        document_id: String,
        chunk_id: u64,
    },
    External {
        url: String,
        #[serde(default)]
        title: String,
    },
}

/// Identity key used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultKey {
    Internal {
        collection_id: String,
        document_id: String,
        chunk_id: u64,
    },
    External {
        url: String,
    },
}

/// A single normalized search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub source: Source,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SearchResult {
    pub fn internal(
        collection_id: impl Into<String>,
        document_id: impl Into<String>,
        chunk_id: u64,
        text: impl Into<String>,
        score: f32,
    ) -> Self {
        Self {
            source: Source::Internal {
                collection_id: collection_id.into(),
                document_id: document_id.into(),
                chunk_id,
            },
            text: text.into(),
            score,
            highlights: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn external(
        url: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
        score: f32,
    ) -> Self {
        Self {
            source: Source::External {
                url: url.into(),
                title: title.into(),
            },
            text: text.into(),
            score,
            highlights: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self.source {
            Source::Internal { .. } => Provenance::Internal,
            Source::External { .. } => Provenance::External,
        }
    }

    pub fn key(&self) -> ResultKey {
        match &self.source {
            Source::Internal {
                collection_id,
                document_id,
                chunk_id,
            } => ResultKey::Internal {
                collection_id: collection_id.clone(),
                document_id: document_id.clone(),
                chunk_id: *chunk_id,
            },
            Source::External { url, .. } => ResultKey::External { url: url.clone() },
        }
    }

    pub fn document_id(&self) -> Option<&str> {
        match &self.source {
            Source::Internal { document_id, .. } => Some(document_id),
            Source::External { .. } => None,
        }
    }

    /// Short human-readable label: `collection/document` or the page title/URL.
    pub fn label(&self) -> String {
        match &self.source {
            Source::Internal {
                collection_id,
                document_id,
                ..
            } => match self.metadata.get("title").and_then(|t| t.as_str()) {
                Some(title) if !title.is_empty() => format!("{collection_id}: {title}"),
                _ => format!("{collection_id}/{document_id}"),
            },
            Source::External { url, title } if title.is_empty() => url.clone(),
            Source::External { url, title } => format!("{title} ({url})"),
        }
    }

    pub fn with_highlights(mut self, highlights: Vec<String>) -> Self {
        self.highlights = highlights;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Cut `text` to at most `ceiling` characters, ending in `marker`.
///
/// Returns the text unchanged (and `false`) when it already fits. The marker
/// counts against the ceiling unless the ceiling is shorter than the marker.
pub fn truncate_chars(text: &str, ceiling: usize, marker: &str) -> (String, bool) {
    if text.chars().count() <= ceiling {
        return (text.to_string(), false);
    }
    let keep = ceiling.saturating_sub(marker.chars().count());
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let mut out = text[..cut].trim_end().to_string();
    out.push_str(marker);
    (out, true)
}

/// An ordered, deduplicated, size-bounded sequence of results.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    items: Vec<SearchResult>,
    seen: HashSet<ResultKey>,
    limit: Option<usize>,
}

impl ResultSet {
    /// A set holding at most `limit` results.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            limit: Some(limit),
        }
    }

    /// A set with no size bound (deduplication only).
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Insert a result. Returns `false` if it was a duplicate or the set is full.
    pub fn push(&mut self, result: SearchResult) -> bool {
        if self.is_full() {
            return false;
        }
        if !self.seen.insert(result.key()) {
            return false;
        }
        self.items.push(result);
        true
    }

    /// Insert results in order; returns how many were accepted.
    pub fn extend<I: IntoIterator<Item = SearchResult>>(&mut self, results: I) -> usize {
        let mut added = 0;
        for r in results {
            if self.is_full() {
                break;
            }
            if self.push(r) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, key: &ResultKey) -> bool {
        self.seen.contains(key)
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|l| self.items.len() >= l)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[SearchResult] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<SearchResult> {
        self.items
    }

    /// Hard-truncate every result text; returns how many were cut.
    pub fn truncate_texts(&mut self, ceiling: usize, marker: &str) -> usize {
        let mut cut = 0;
        for item in &mut self.items {
            let (text, truncated) = truncate_chars(&item.text, ceiling, marker);
            if truncated {
                item.text = text;
                cut += 1;
            }
        }
        cut
    }
}

impl Serialize for ResultSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a SearchResult;
    type IntoIter = std::slice::Iter<'a, SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
