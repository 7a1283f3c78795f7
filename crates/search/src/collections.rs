//! Collection adapters.
//!
//! Each collection stores a differently shaped document. An adapter knows
//! which fields hold the text, the title and the identity of a chunk, how
//! to weight fields in a free-text query, and how to turn a loosely typed
//! [`RawHit`] into a [`SearchResult`].

use lexrag_config::{CollectionKind, CollectionsConfig};
use lexrag_core::{FieldBoost, RawHit, SearchResult};
use serde_json::Value;

pub const DOCUMENT_ID_FIELD: &str = "document_id";
pub const CHUNK_ID_FIELD: &str = "chunk_id";
pub const CASE_NUMBER_FIELD: &str = "case_number";

/// Party-name fields of the court-decision index.
pub const PARTY_FIELDS: &[&str] = &["claimant", "defendant"];

/// Field layout of one collection kind.
#[derive(Debug)]
pub struct CollectionSchema {
    pub text_field: &'static str,
    pub title_field: &'static str,
    /// Free-text query fields with their boosts, strongest first.
    pub boosts: &'static [(&'static str, f32)],
    /// Source fields copied into result metadata when present.
    pub metadata_fields: &'static [&'static str],
}

static COURT_DECISIONS: CollectionSchema = CollectionSchema {
    text_field: "text",
    title_field: "title",
    boosts: &[("case_number", 4.0), ("title", 3.0), ("summary", 2.0), ("text", 1.0)],
    metadata_fields: &["case_number", "court", "date", "claimant", "defendant"],
};

static LEGISLATION: CollectionSchema = CollectionSchema {
    text_field: "text",
    title_field: "title",
    boosts: &[("article", 3.0), ("title", 2.5), ("text", 1.0)],
    metadata_fields: &["article", "act", "edition_date"],
};

static LEGAL_PRACTICE: CollectionSchema = CollectionSchema {
    text_field: "text",
    title_field: "title",
    boosts: &[("title", 3.0), ("summary", 2.0), ("text", 1.0)],
    metadata_fields: &["source", "date"],
};

static COMMENTARY: CollectionSchema = CollectionSchema {
    text_field: "text",
    title_field: "title",
    boosts: &[("title", 2.5), ("article", 2.0), ("text", 1.0)],
    metadata_fields: &["article", "author"],
};

static FORMS: CollectionSchema = CollectionSchema {
    text_field: "text",
    title_field: "title",
    boosts: &[("title", 4.0), ("subject", 3.0), ("category", 2.0), ("text", 1.0)],
    metadata_fields: &["subject", "category"],
};

pub fn schema(kind: CollectionKind) -> &'static CollectionSchema {
    match kind {
        CollectionKind::CourtDecisions => &COURT_DECISIONS,
        CollectionKind::Legislation => &LEGISLATION,
        CollectionKind::LegalPractice => &LEGAL_PRACTICE,
        CollectionKind::Commentary => &COMMENTARY,
        CollectionKind::Forms => &FORMS,
    }
}

/// A physical collection bound to its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionAdapter {
    id: String,
    kind: CollectionKind,
}

impl CollectionAdapter {
    pub fn new(id: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn schema(&self) -> &'static CollectionSchema {
        schema(self.kind)
    }

    pub fn free_text_fields(&self) -> Vec<FieldBoost> {
        self.schema()
            .boosts
            .iter()
            .map(|(field, boost)| FieldBoost::new(*field, *boost))
            .collect()
    }

    /// Fields searched by phrase queries: text, then title.
    pub fn full_text_fields(&self) -> Vec<String> {
        let s = self.schema();
        vec![s.text_field.to_string(), s.title_field.to_string()]
    }

    /// Normalize a backend hit from this collection.
    pub fn to_result(&self, hit: RawHit) -> SearchResult {
        let schema = self.schema();
        let document_id = hit
            .source
            .get(DOCUMENT_ID_FIELD)
            .and_then(value_to_string)
            .unwrap_or_else(|| hit.id.clone());
        let chunk_id = hit
            .source
            .get(CHUNK_ID_FIELD)
            .and_then(value_to_u64)
            .unwrap_or(0);
        let text = hit
            .source
            .get(schema.text_field)
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut result = SearchResult::internal(&self.id, document_id, chunk_id, text, hit.score)
            .with_metadata("kind", Value::from(self.kind.as_str()));

        if let Some(title) = hit.source.get(schema.title_field).and_then(Value::as_str) {
            result = result.with_metadata("title", Value::from(title));
        }
        for field in schema.metadata_fields {
            match hit.source.get(*field) {
                Some(Value::Null) | None => {}
                Some(value) => {
                    result.metadata.insert((*field).to_string(), value.clone());
                }
            }
        }

        result.highlights = hit.highlights.into_values().flatten().collect();
        result
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Every collection the orchestrator may query, resolved from config.
#[derive(Debug, Clone)]
pub struct CollectionCatalog {
    case: CollectionAdapter,
    forms: CollectionAdapter,
    free_text: Vec<CollectionAdapter>,
    designated: usize,
}

impl CollectionCatalog {
    pub fn new(
        case: CollectionAdapter,
        forms: CollectionAdapter,
        free_text: Vec<CollectionAdapter>,
        designated: &str,
    ) -> Self {
        let designated = free_text
            .iter()
            .position(|c| c.id == designated)
            .unwrap_or(0);
        Self {
            case,
            forms,
            free_text,
            designated,
        }
    }

    pub fn from_config(config: &CollectionsConfig) -> Self {
        let case_kind = config
            .kind_of(&config.case_collection)
            .unwrap_or(CollectionKind::CourtDecisions);
        let forms_kind = config
            .kind_of(&config.forms_collection)
            .unwrap_or(CollectionKind::Forms);
        Self::new(
            CollectionAdapter::new(&config.case_collection, case_kind),
            CollectionAdapter::new(&config.forms_collection, forms_kind),
            config
                .free_text
                .iter()
                .map(|c| CollectionAdapter::new(&c.id, c.kind))
                .collect(),
            &config.designated,
        )
    }

    pub fn case_collection(&self) -> &CollectionAdapter {
        &self.case
    }

    pub fn forms_collection(&self) -> &CollectionAdapter {
        &self.forms
    }

    /// Free-text collections in merge priority order.
    pub fn free_text(&self) -> &[CollectionAdapter] {
        &self.free_text
    }

    /// Index into [`Self::free_text`] of the remainder collection.
    pub fn designated_index(&self) -> usize {
        self.designated
    }

    /// Look up any known collection by id.
    pub fn get(&self, id: &str) -> Option<&CollectionAdapter> {
        std::iter::once(&self.case)
            .chain(std::iter::once(&self.forms))
            .chain(self.free_text.iter())
            .find(|c| c.id == id)
    }
}

impl Default for CollectionCatalog {
    fn default() -> Self {
        Self::from_config(&CollectionsConfig::default())
    }
}
