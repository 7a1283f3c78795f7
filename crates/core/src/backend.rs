//! Search backend trait: the abstraction over document stores.
//!
//! The orchestrator describes what it wants with a backend-agnostic
//! [`QuerySpec`]; each backend translates it into its own query language
//! (Elasticsearch DSL over HTTP, in-process evaluation for tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// A field name with a relevance boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBoost {
    pub field: String,
    pub boost: f32,
}

impl FieldBoost {
    pub fn new(field: impl Into<String>, boost: f32) -> Self {
        Self {
            field: field.into(),
            boost,
        }
    }
}

/// A boolean query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Clause {
    /// Exact match of `field` against any of `values`.
    Terms { field: String, values: Vec<String> },
    /// Phrase match of `text` inside `field`.
    Phrase { field: String, text: String },
    /// Full-text match across boosted fields.
    MultiMatch {
        query: String,
        fields: Vec<FieldBoost>,
        fuzzy: bool,
    },
    /// Boolean combination.
    Bool {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        must: Vec<Clause>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        should: Vec<Clause>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum_should_match: Option<u32>,
    },
}

impl Clause {
    /// OR of `clauses` with at least `min` of them matching.
    pub fn any_of(clauses: Vec<Clause>, min: u32) -> Self {
        Self::Bool {
            must: Vec::new(),
            should: clauses,
            minimum_should_match: Some(min),
        }
    }
}

/// A complete search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub clause: Clause,
    /// Return at most one hit per distinct value of this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse_field: Option<String>,
    /// Fields to produce highlight fragments for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlight_fields: Vec<String>,
}

impl QuerySpec {
    pub fn new(clause: Clause) -> Self {
        Self {
            clause,
            collapse_field: None,
            highlight_fields: Vec::new(),
        }
    }

    pub fn collapse_on(mut self, field: impl Into<String>) -> Self {
        self.collapse_field = Some(field.into());
        self
    }

    pub fn highlight(mut self, fields: &[&str]) -> Self {
        self.highlight_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// A raw, loosely-typed hit as returned by a backend.
///
/// Collection adapters turn these into [`crate::result::SearchResult`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub id: String,
    pub score: f32,
    pub source: serde_json::Map<String, serde_json::Value>,
    /// Highlight fragments per field.
    #[serde(default)]
    pub highlights: std::collections::BTreeMap<String, Vec<String>>,
}

/// The core search backend trait.
///
/// Implementations are constructed once at startup and shared read-only
/// across concurrent requests.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "elasticsearch", "in_memory").
    fn name(&self) -> &str;

    /// Run `query` against the physical `collection`, returning at most `size` ranked hits.
    async fn search(
        &self,
        collection: &str,
        query: &QuerySpec,
        size: usize,
    ) -> Result<Vec<RawHit>, SearchError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}
