//! Cascading search orchestrator.
//!
//! Routes a [`QueryClassification`] to the strategy for its type and falls
//! through to lower-priority strategies while nothing is found:
//!
//! - `case_number` → `doc_type` (when the raw query names one) → `free_text`
//! - `company` → `doc_type` (same condition) → `free_text`
//! - `doc_type` → `free_text`
//! - `free_text`
//!
//! Every backend call runs under its own timeout. A failed call is logged
//! and contributes nothing; the orchestrator only errors when every call
//! it made failed.

use crate::collections::{CollectionAdapter, CollectionCatalog};
use crate::strategies;
use futures::future::join_all;
use lexrag_classifier::detect_doc_type;
use lexrag_config::{RetrievalConfig, SearchConfig};
use lexrag_core::{
    CaseNumber, CompanyEntity, Entities, QueryClassification, QuerySpec, QueryType, ResultSet,
    SearchBackend, SearchError, SearchResult,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub doc_type_cap: usize,
    pub result_char_ceiling: usize,
    pub truncation_marker: String,
    /// Timeout for each individual backend call.
    pub call_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default(), &SearchConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(retrieval: &RetrievalConfig, search: &SearchConfig) -> Self {
        Self {
            doc_type_cap: retrieval.doc_type_cap,
            result_char_ceiling: retrieval.result_char_ceiling,
            truncation_marker: retrieval.truncation_marker.clone(),
            call_timeout: Duration::from_millis(search.timeout_ms),
        }
    }
}

/// One backend call made while serving a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionAttempt {
    pub collection: String,
    pub strategy: QueryType,
    pub hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl CollectionAttempt {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// The result of one orchestrated search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: ResultSet,
    /// Strategies tried, in order.
    pub attempted: Vec<QueryType>,
    /// The strategy whose results were returned, if any produced results.
    pub produced_by: Option<QueryType>,
    pub attempts: Vec<CollectionAttempt>,
}

impl SearchOutcome {
    fn empty() -> Self {
        Self {
            results: ResultSet::unbounded(),
            attempted: Vec::new(),
            produced_by: None,
            attempts: Vec::new(),
        }
    }

    pub fn failed_calls(&self) -> usize {
        self.attempts.iter().filter(|a| a.failed()).count()
    }
}

enum Step<'a> {
    CaseNumber(&'a CaseNumber),
    Company(&'a CompanyEntity),
    DocType(String),
    FreeText,
}

impl Step<'_> {
    fn strategy(&self) -> QueryType {
        match self {
            Self::CaseNumber(_) => QueryType::CaseNumber,
            Self::Company(_) => QueryType::Company,
            Self::DocType(_) => QueryType::DocType,
            Self::FreeText => QueryType::FreeText,
        }
    }
}

/// Build the fallback chain for a classification.
fn plan(classification: &QueryClassification) -> Vec<Step<'_>> {
    let raw_doc_type = || detect_doc_type(classification.original_query()).map(str::to_string);
    let mut steps = Vec::new();
    match classification.entities() {
        Entities::CaseNumber(number) => {
            steps.push(Step::CaseNumber(number));
            steps.extend(raw_doc_type().map(Step::DocType));
        }
        Entities::Company(company) => {
            steps.push(Step::Company(company));
            steps.extend(raw_doc_type().map(Step::DocType));
        }
        Entities::DocType(doc) => steps.push(Step::DocType(doc.phrase.clone())),
        Entities::None => {}
    }
    steps.push(Step::FreeText);
    steps
}

/// The cascading search orchestrator.
pub struct SearchOrchestrator {
    backend: Arc<dyn SearchBackend>,
    catalog: CollectionCatalog,
    settings: OrchestratorSettings,
}

impl SearchOrchestrator {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        catalog: CollectionCatalog,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            backend,
            catalog,
            settings,
        }
    }

    pub fn catalog(&self) -> &CollectionCatalog {
        &self.catalog
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run the cascade for `classification`, returning at most `top_n` results.
    pub async fn search(
        &self,
        classification: &QueryClassification,
        top_n: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let mut outcome = SearchOutcome::empty();
        if top_n == 0 {
            return Ok(outcome);
        }

        for step in plan(classification) {
            let strategy = step.strategy();
            outcome.attempted.push(strategy);

            let (results, attempts) = self.run_step(&step, classification, top_n).await;
            outcome.attempts.extend(attempts);

            if results.is_empty() {
                debug!(strategy = %strategy, "Strategy produced no results, falling through");
                continue;
            }

            info!(
                strategy = %strategy,
                results = results.len(),
                "Search strategy produced results"
            );
            outcome.results = results;
            outcome.produced_by = Some(strategy);
            return Ok(outcome);
        }

        let failed = outcome.failed_calls();
        if failed > 0 && failed == outcome.attempts.len() {
            let last_error = outcome
                .attempts
                .iter()
                .rev()
                .find_map(|a| a.error.clone())
                .unwrap_or_default();
            warn!(attempted = failed, "Every search call failed");
            return Err(SearchError::AllSourcesUnavailable {
                attempted: failed,
                last_error,
            });
        }

        Ok(outcome)
    }

    async fn run_step(
        &self,
        step: &Step<'_>,
        classification: &QueryClassification,
        top_n: usize,
    ) -> (ResultSet, Vec<CollectionAttempt>) {
        let strategy = step.strategy();
        let mut set = ResultSet::with_limit(top_n);

        match step {
            Step::CaseNumber(number) => {
                let adapter = self.catalog.case_collection();
                let spec = strategies::case_number_query(number, adapter);
                let size = top_n.saturating_mul(strategies::CHUNKS_PER_DOCUMENT);
                let (hits, attempt) = self.call(adapter, strategy, &spec, size).await;
                set.extend(strategies::group_by_document(hits, top_n));
                (set, vec![attempt])
            }
            Step::Company(company) => {
                let adapter = self.catalog.case_collection();
                let Some(spec) = strategies::company_query(company, adapter) else {
                    return (set, Vec::new());
                };
                let (hits, attempt) = self.call(adapter, strategy, &spec, top_n).await;
                set.extend(hits);
                (set, vec![attempt])
            }
            Step::DocType(phrase) => {
                let adapter = self.catalog.forms_collection();
                let limit = strategies::doc_type_limit(self.settings.doc_type_cap, top_n);
                if limit == 0 {
                    return (set, Vec::new());
                }
                let spec = strategies::doc_type_query(phrase, adapter);
                let (hits, attempt) = self.call(adapter, strategy, &spec, limit).await;
                let mut capped = ResultSet::with_limit(limit);
                capped.extend(hits);
                (capped, vec![attempt])
            }
            Step::FreeText => {
                let attempts = self
                    .free_text(classification.original_query(), top_n, &mut set)
                    .await;
                (set, attempts)
            }
        }
    }

    /// Fan out across the free-text collections and merge in priority order.
    async fn free_text(
        &self,
        query: &str,
        top_n: usize,
        set: &mut ResultSet,
    ) -> Vec<CollectionAttempt> {
        let collections = self.catalog.free_text();
        let allocation =
            strategies::allocate(top_n, collections.len(), self.catalog.designated_index());

        let calls = collections
            .iter()
            .zip(allocation.iter().copied())
            .filter(|(_, limit)| *limit > 0)
            .map(|(adapter, limit)| async move {
                let spec = strategies::free_text_query(query, adapter);
                let (mut hits, attempt) = self
                    .call(adapter, QueryType::FreeText, &spec, limit)
                    .await;
                hits.truncate(limit);
                (hits, attempt)
            });

        let mut attempts = Vec::new();
        for (hits, attempt) in join_all(calls).await {
            set.extend(hits);
            attempts.push(attempt);
        }

        let cut = set.truncate_texts(
            self.settings.result_char_ceiling,
            &self.settings.truncation_marker,
        );
        if cut > 0 {
            debug!(truncated = cut, "Free-text results truncated to character ceiling");
        }
        attempts
    }

    /// One backend call under the per-call timeout; failures become empty hits.
    async fn call(
        &self,
        adapter: &CollectionAdapter,
        strategy: QueryType,
        spec: &QuerySpec,
        size: usize,
    ) -> (Vec<SearchResult>, CollectionAttempt) {
        let started = Instant::now();
        let timeout = self.settings.call_timeout;
        let outcome = tokio::time::timeout(timeout, self.backend.search(adapter.id(), spec, size))
            .await
            .unwrap_or_else(|_| {
                Err(SearchError::Timeout {
                    collection: adapter.id().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            });
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(hits) => {
                let results: Vec<SearchResult> =
                    hits.into_iter().map(|h| adapter.to_result(h)).collect();
                debug!(
                    collection = %adapter.id(),
                    strategy = %strategy,
                    hits = results.len(),
                    elapsed_ms,
                    "Search call completed"
                );
                let attempt = CollectionAttempt {
                    collection: adapter.id().to_string(),
                    strategy,
                    hits: results.len(),
                    error: None,
                    elapsed_ms,
                };
                (results, attempt)
            }
            Err(e) => {
                warn!(
                    collection = %adapter.id(),
                    strategy = %strategy,
                    error = %e,
                    "Search call failed, contributing no results"
                );
                let attempt = CollectionAttempt {
                    collection: adapter.id().to_string(),
                    strategy,
                    hits: 0,
                    error: Some(e.to_string()),
                    elapsed_ms,
                };
                (Vec::new(), attempt)
            }
        }
    }
}
