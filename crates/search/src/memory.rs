//! In-memory backend: useful for testing and for running without a cluster.
//!
//! Evaluates a [`QuerySpec`] directly against JSON documents: exact terms,
//! case-insensitive phrases, and a prefix-stemmed multi-match that is close
//! enough to a real analyzer for Russian inflection in tests.

use async_trait::async_trait;
use lexrag_core::{Clause, FieldBoost, QuerySpec, RawHit, SearchBackend, SearchError};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

type Document = Map<String, Value>;

/// Characters kept on each side of a highlighted term.
const HIGHLIGHT_WINDOW: usize = 60;

/// Fuzzy matching compares word prefixes of this many characters.
const STEM_CHARS: usize = 5;

/// An in-memory backend storing documents per collection.
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Build from `{"collection": [document, ...], ...}`.
    pub fn from_seed(seed: Value) -> Result<Self, SearchError> {
        let Value::Object(map) = seed else {
            return Err(SearchError::InvalidResponse(
                "seed must be an object of collection -> documents".into(),
            ));
        };
        let mut collections = HashMap::new();
        for (name, docs) in map {
            let Value::Array(docs) = docs else {
                return Err(SearchError::InvalidResponse(format!(
                    "seed collection '{name}' must be an array"
                )));
            };
            let docs = docs
                .into_iter()
                .filter_map(|d| match d {
                    Value::Object(doc) => Some(doc),
                    _ => None,
                })
                .collect();
            collections.insert(name, docs);
        }
        Ok(Self {
            collections: RwLock::new(collections),
        })
    }

    /// Load a seed file in the [`Self::from_seed`] format.
    pub fn from_file(path: &Path) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SearchError::InvalidResponse(format!("cannot read {}: {e}", path.display()))
        })?;
        let seed: Value = serde_json::from_str(&content).map_err(|e| {
            SearchError::InvalidResponse(format!("cannot parse {}: {e}", path.display()))
        })?;
        Self::from_seed(seed)
    }

    /// Create an empty collection (no-op if it exists).
    pub async fn create_collection(&self, collection: &str) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
    }

    /// Add a document, creating the collection on first use.
    pub async fn insert(&self, collection: &str, document: Value) -> Result<(), SearchError> {
        let Value::Object(doc) = document else {
            return Err(SearchError::InvalidResponse("document must be an object".into()));
        };
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(())
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(
        &self,
        collection: &str,
        query: &QuerySpec,
        size: usize,
    ) -> Result<Vec<RawHit>, SearchError> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection)
            .ok_or_else(|| SearchError::UnknownCollection(collection.to_string()))?;

        let mut scored: Vec<(usize, f32)> = docs
            .iter()
            .enumerate()
            .filter_map(|(i, doc)| score_clause(&query.clause, doc).map(|s| (i, s)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let terms = highlight_terms(&query.clause);
        let mut seen_groups = HashSet::new();
        let mut hits = Vec::new();
        for (i, score) in scored {
            if hits.len() >= size {
                break;
            }
            let doc = &docs[i];
            if let Some(field) = &query.collapse_field {
                let group = doc.get(field).map(Value::to_string).unwrap_or_default();
                if !seen_groups.insert(group) {
                    continue;
                }
            }
            let mut highlights = BTreeMap::new();
            for field in &query.highlight_fields {
                if let Some(fragment) = doc
                    .get(field)
                    .and_then(Value::as_str)
                    .and_then(|text| highlight(text, &terms))
                {
                    highlights.insert(field.clone(), vec![fragment]);
                }
            }
            hits.push(RawHit {
                id: format!("{collection}:{i}"),
                score,
                source: doc.clone(),
                highlights,
            });
        }
        Ok(hits)
    }
}

// ── Query evaluation ───────────────────────────────────────────────────────

fn field_strings(doc: &Document, field: &str) -> Vec<String> {
    match doc.get(field) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::Number(n)) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn stem(word: &str) -> String {
    word.chars().take(STEM_CHARS).collect()
}

fn score_clause(clause: &Clause, doc: &Document) -> Option<f32> {
    match clause {
        Clause::Terms { field, values } => {
            let present = field_strings(doc, field);
            values
                .iter()
                .any(|v| present.iter().any(|p| p == v))
                .then_some(1.0)
        }
        Clause::Phrase { field, text } => {
            let needle = text.to_lowercase();
            let count: usize = field_strings(doc, field)
                .iter()
                .map(|s| s.to_lowercase().matches(&needle).count())
                .sum();
            (count > 0).then(|| 1.0 + count as f32 * 0.1)
        }
        Clause::MultiMatch {
            query,
            fields,
            fuzzy,
        } => score_multi_match(query, fields, *fuzzy, doc),
        Clause::Bool {
            must,
            should,
            minimum_should_match,
        } => {
            let mut total = 0.0;
            for c in must {
                total += score_clause(c, doc)?;
            }
            let mut matched = 0u32;
            for c in should {
                if let Some(s) = score_clause(c, doc) {
                    matched += 1;
                    total += s;
                }
            }
            let required = minimum_should_match.unwrap_or(if must.is_empty() { 1 } else { 0 });
            (matched >= required && (!must.is_empty() || matched > 0)).then_some(total)
        }
    }
}

fn score_multi_match(query: &str, fields: &[FieldBoost], fuzzy: bool, doc: &Document) -> Option<f32> {
    let terms = words(query);
    if terms.is_empty() {
        return None;
    }
    let mut score = 0.0;
    for fb in fields {
        let doc_words: Vec<String> = field_strings(doc, &fb.field)
            .iter()
            .flat_map(|s| words(s))
            .collect();
        let matched = terms
            .iter()
            .filter(|t| {
                doc_words.iter().any(|w| {
                    if fuzzy {
                        stem(w) == stem(t)
                    } else {
                        w == *t
                    }
                })
            })
            .count();
        score += matched as f32 * fb.boost;
    }
    (score > 0.0).then_some(score)
}

fn highlight_terms(clause: &Clause) -> Vec<String> {
    let mut out = Vec::new();
    collect_terms(clause, &mut out);
    out
}

fn collect_terms(clause: &Clause, out: &mut Vec<String>) {
    match clause {
        Clause::Terms { values, .. } => out.extend(values.iter().map(|v| v.to_lowercase())),
        Clause::Phrase { text, .. } => out.push(text.to_lowercase()),
        Clause::MultiMatch { query, .. } => out.extend(words(query)),
        Clause::Bool { must, should, .. } => {
            for c in must.iter().chain(should) {
                collect_terms(c, out);
            }
        }
    }
}

/// A fragment around the first matching term, with the term in `<em>`.
fn highlight(text: &str, terms: &[String]) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let lower: Vec<char> = text.to_lowercase().chars().collect();
    if chars.len() != lower.len() {
        return None;
    }
    for term in terms {
        let needle: Vec<char> = term.chars().collect();
        if needle.is_empty() || needle.len() > lower.len() {
            continue;
        }
        let Some(start) = lower.windows(needle.len()).position(|w| w == needle.as_slice()) else {
            continue;
        };
        let end = start + needle.len();
        let from = start.saturating_sub(HIGHLIGHT_WINDOW);
        let to = (end + HIGHLIGHT_WINDOW).min(chars.len());
        let before: String = chars[from..start].iter().collect();
        let hit: String = chars[start..end].iter().collect();
        let after: String = chars[end..to].iter().collect();
        return Some(format!("{before}<em>{hit}</em>{after}"));
    }
    None
}
