//! External search coordinator.
//!
//! Supplements internal evidence with web search. One run:
//!
//! 1. Searches the internal collections for the original classification,
//!    concurrently with asking the rewriter for query variants (timeout T1)
//! 2. For each variant launches a web search and an internal search of the
//!    re-classified variant (the latter only when the variant differs from
//!    the original query)
//! 3. Joins every branch; a failed branch contributes nothing
//! 4. Deduplicates internal results by identity key, external ones by URL,
//!    and scans everything for case numbers
//!
//! Internal results are bounded by `top_n` with the primary branch filling
//! first; external results are bounded by `web_max_results`.
//!
//! The run is an error only when every branch failed.

use crate::rewrite::{QueryRewriter, RewriteOutcome};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use lexrag_classifier::{classify, find_case_numbers};
use lexrag_config::AppConfig;
use lexrag_core::{ProviderError, QueryClassification, ResultSet, SearchResult, WebSearchProvider};
use lexrag_search::SearchOrchestrator;
use lexrag_telemetry::{BranchKind, ExecutionRecord, Observer, RetrievalEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors from a coordinator run.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("All {attempted} search branches failed; last error: {last_error}")]
    AllBranchesFailed {
        attempted: usize,
        last_error: String,
        record: Box<ExecutionRecord>,
    },
}

impl CoordinatorError {
    pub fn record(&self) -> &ExecutionRecord {
        match self {
            Self::AllBranchesFailed { record, .. } => record,
        }
    }
}

/// Limits applied to each branch.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Result limit of every internal search.
    pub top_n: usize,
    pub web_max_results: usize,
    /// Per-call web-search timeout.
    pub web_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            web_max_results: 5,
            web_timeout: Duration::from_secs(15),
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_n: config.retrieval.top_n,
            web_max_results: config.web_search.max_results,
            web_timeout: Duration::from_millis(config.web_search.timeout_ms),
        }
    }
}

/// Merged, provenance-tagged evidence of one run.
#[derive(Debug, Clone)]
pub struct EvidenceEnvelope {
    pub internal: ResultSet,
    pub external: ResultSet,
    /// The query variants searched externally.
    pub variants: Vec<String>,
    pub rewrite_fell_back: bool,
    /// Case numbers seen in the query or any result (Cyrillic form).
    pub case_numbers: Vec<String>,
    pub record: ExecutionRecord,
}

impl EvidenceEnvelope {
    /// Internal results first, then external.
    pub fn evidence(&self) -> Vec<SearchResult> {
        self.internal
            .iter()
            .chain(self.external.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }
}

/// Result of one branch.
struct BranchOutcome {
    kind: BranchKind,
    variant: usize,
    result: Result<Vec<SearchResult>, String>,
}

/// Fans a query out to internal and external search.
pub struct ExternalSearchCoordinator {
    orchestrator: Arc<SearchOrchestrator>,
    web: Option<Arc<dyn WebSearchProvider>>,
    rewriter: QueryRewriter,
    settings: CoordinatorSettings,
}

impl ExternalSearchCoordinator {
    pub fn new(
        orchestrator: Arc<SearchOrchestrator>,
        web: Option<Arc<dyn WebSearchProvider>>,
        rewriter: QueryRewriter,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            orchestrator,
            web,
            rewriter,
            settings,
        }
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    pub fn has_web_search(&self) -> bool {
        self.web.is_some()
    }

    /// Run every branch for `classification` and merge the results.
    pub async fn run(
        &self,
        classification: &QueryClassification,
        observer: &dyn Observer,
    ) -> Result<EvidenceEnvelope, CoordinatorError> {
        let mut record = ExecutionRecord::start();
        let query = classification.original_query();

        let primary = self.internal_branch(classification.clone(), 0, observer);
        let variants = async {
            let rewrite = self.rewriter.rewrite(query).await;
            observer.on_event(&RetrievalEvent::Rewritten {
                variants: rewrite.variants.len(),
                fell_back: rewrite.fell_back,
                reason: rewrite.reason.clone(),
            });
            let outcomes = join_all(self.variant_branches(query, &rewrite, observer)).await;
            (rewrite, outcomes)
        };
        let (primary, (rewrite, outcomes)) = tokio::join!(primary, variants);

        let mut internal = ResultSet::with_limit(self.settings.top_n);
        let mut external = ResultSet::with_limit(self.settings.web_max_results);
        let mut attempted = 0;
        let mut succeeded = 0;
        let mut last_error = String::new();

        for outcome in std::iter::once(primary).chain(outcomes) {
            attempted += 1;
            match outcome.result {
                Ok(results) => {
                    succeeded += 1;
                    record.record_branch(outcome.kind, outcome.variant, results.len());
                    match outcome.kind {
                        BranchKind::Internal => internal.extend(results),
                        BranchKind::External => external.extend(results),
                    };
                }
                Err(error) => {
                    record.record_failure(outcome.kind, outcome.variant, error.clone());
                    last_error = error;
                }
            }
        }

        if succeeded == 0 {
            record.finish(false);
            warn!(attempted, "Every search branch failed");
            return Err(CoordinatorError::AllBranchesFailed {
                attempted,
                last_error,
                record: Box::new(record),
            });
        }

        let case_numbers = scan_case_numbers(query, &internal, &external);
        observer.on_event(&RetrievalEvent::EvidenceMerged {
            internal: internal.len(),
            external: external.len(),
            case_numbers: case_numbers.len(),
        });
        record.finish(true);

        info!(
            internal = internal.len(),
            external = external.len(),
            branches = attempted,
            failed = attempted - succeeded,
            execution_time_ms = record.execution_time_ms,
            "Evidence gathered"
        );

        Ok(EvidenceEnvelope {
            internal,
            external,
            variants: rewrite.variants,
            rewrite_fell_back: rewrite.fell_back,
            case_numbers,
            record,
        })
    }

    fn variant_branches<'a>(
        &'a self,
        query: &str,
        rewrite: &RewriteOutcome,
        observer: &'a dyn Observer,
    ) -> Vec<BoxFuture<'a, BranchOutcome>> {
        let mut branches = Vec::new();
        for (i, variant) in rewrite.variants.iter().enumerate() {
            let index = i + 1;
            if let Some(web) = &self.web {
                branches.push(
                    self.external_branch(web.as_ref(), variant.clone(), index, observer)
                        .boxed(),
                );
            }
            if variant.trim() != query.trim() {
                branches.push(
                    self.internal_branch(classify(variant), index, observer)
                        .boxed(),
                );
            }
        }
        debug!(branches = branches.len(), "Variant branches launched");
        branches
    }

    async fn internal_branch(
        &self,
        classification: QueryClassification,
        variant: usize,
        observer: &dyn Observer,
    ) -> BranchOutcome {
        let kind = BranchKind::Internal;
        observer.on_event(&RetrievalEvent::BranchStarted { kind, variant });
        let started = Instant::now();
        let result = self
            .orchestrator
            .search(&classification, self.settings.top_n)
            .await
            .map(|outcome| outcome.results.into_vec())
            .map_err(|e| e.to_string());
        finish_branch(kind, variant, result, started, observer)
    }

    async fn external_branch(
        &self,
        web: &dyn WebSearchProvider,
        text: String,
        variant: usize,
        observer: &dyn Observer,
    ) -> BranchOutcome {
        let kind = BranchKind::External;
        observer.on_event(&RetrievalEvent::BranchStarted { kind, variant });
        let started = Instant::now();
        let timeout = self.settings.web_timeout;
        let result =
            match tokio::time::timeout(timeout, web.search(&text, self.settings.web_max_results))
                .await
            {
                Ok(Ok(hits)) => Ok(hits
                    .into_iter()
                    .map(|h| SearchResult::external(h.url, h.title, h.content, h.score))
                    .collect()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(ProviderError::Timeout(format!(
                    "{} did not answer within {}ms",
                    web.name(),
                    timeout.as_millis()
                ))
                .to_string()),
            };
        finish_branch(kind, variant, result, started, observer)
    }
}

fn finish_branch(
    kind: BranchKind,
    variant: usize,
    result: Result<Vec<SearchResult>, String>,
    started: Instant,
    observer: &dyn Observer,
) -> BranchOutcome {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(results) => {
            debug!(kind = %kind, variant, results = results.len(), elapsed_ms, "Branch finished");
            observer.on_event(&RetrievalEvent::BranchFinished {
                kind,
                variant,
                results: results.len(),
                elapsed_ms,
            });
        }
        Err(error) => {
            warn!(kind = %kind, variant, error = %error, elapsed_ms, "Branch failed");
            observer.on_event(&RetrievalEvent::BranchFailed {
                kind,
                variant,
                error: error.clone(),
                elapsed_ms,
            });
        }
    }
    BranchOutcome {
        kind,
        variant,
        result,
    }
}

/// Distinct case numbers in the query and result texts, in order of appearance.
fn scan_case_numbers(query: &str, internal: &ResultSet, external: &ResultSet) -> Vec<String> {
    let texts = std::iter::once(query)
        .chain(internal.iter().map(|r| r.text.as_str()))
        .chain(external.iter().map(|r| r.text.as_str()));
    let mut out: Vec<String> = Vec::new();
    for text in texts {
        for number in find_case_numbers(text) {
            let canonical = number.cyrillic().to_string();
            if !out.contains(&canonical) {
                out.push(canonical);
            }
        }
    }
    out
}
