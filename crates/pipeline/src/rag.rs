//! The retrieve-and-assemble entry point.
//!
//! # Flow
//!
//! 1. Classify the query
//! 2. Gather internal and external evidence through the coordinator
//! 3. Assemble the context window within the token budget, with the query
//!    as the current user turn
//!
//! A context is always returned. When no evidence source answered, the
//! context carries the history and the query alone and the metadata says
//! `success: false`.

use crate::coordinator::{CoordinatorSettings, ExternalSearchCoordinator};
use crate::rewrite::QueryRewriter;
use chrono::{DateTime, Utc};
use lexrag_classifier::classify_detailed;
use lexrag_config::AppConfig;
use lexrag_context::{AssembledContext, AssemblyInput, ContextAssembler, EvidencePolicy, TokenCounter};
use lexrag_core::{
    ChatMessage, QueryClassification, Role, SearchBackend, SearchResult, Source, TextGenerator,
    WebSearchProvider,
};
use lexrag_search::{CollectionCatalog, OrchestratorSettings, SearchOrchestrator};
use lexrag_telemetry::{ExecutionRecord, Observer, RetrievalEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What was retrieved, and how, for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    pub classification: QueryClassification,
    /// More than one detector matched the query.
    pub ambiguous: bool,
    pub variants: Vec<String>,
    pub rewrite_fell_back: bool,
    pub internal_results: usize,
    pub external_results: usize,
    /// Origin of every evidence item, internal first.
    pub sources: Vec<Source>,
    pub case_numbers: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub per_branch_counts: std::collections::BTreeMap<String, usize>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvidenceMetadata {
    /// Metadata seeded from the classification and execution record.
    pub fn new(
        classification: QueryClassification,
        ambiguous: bool,
        record: ExecutionRecord,
    ) -> Self {
        Self {
            variants: vec![classification.original_query().to_string()],
            classification,
            ambiguous,
            rewrite_fell_back: false,
            internal_results: 0,
            external_results: 0,
            sources: Vec::new(),
            case_numbers: Vec::new(),
            start_time: record.start_time,
            execution_time_ms: record.execution_time_ms,
            per_branch_counts: record.per_branch_counts,
            success: record.success,
            error: None,
        }
    }
}

/// Wires classification, search and assembly together.
pub struct RetrievalPipeline {
    coordinator: ExternalSearchCoordinator,
    assembler: ContextAssembler,
    system_prompt: String,
}

impl RetrievalPipeline {
    pub fn new(
        coordinator: ExternalSearchCoordinator,
        assembler: ContextAssembler,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            assembler,
            system_prompt: system_prompt.into(),
        }
    }

    /// Build every component from configuration and the service handles.
    pub fn from_config(
        config: &AppConfig,
        backend: Arc<dyn SearchBackend>,
        web: Option<Arc<dyn WebSearchProvider>>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        let orchestrator = SearchOrchestrator::new(
            backend,
            CollectionCatalog::from_config(&config.collections),
            OrchestratorSettings::from_config(&config.retrieval, &config.search),
        );
        let coordinator = ExternalSearchCoordinator::new(
            Arc::new(orchestrator),
            web,
            QueryRewriter::from_config(generator, &config.rewrite),
            CoordinatorSettings::from_config(config),
        );
        let assembler = ContextAssembler::new(
            TokenCounter::from_name(&config.context.tokenizer),
            EvidencePolicy::from_config(&config.context, &config.retrieval.truncation_marker),
        );
        Self::new(coordinator, assembler, &config.context.system_prompt)
    }

    pub fn coordinator(&self) -> &ExternalSearchCoordinator {
        &self.coordinator
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Retrieve evidence for `query` and pack it with `history` into `token_budget`.
    pub async fn retrieve_and_assemble(
        &self,
        query: &str,
        history: &[ChatMessage],
        token_budget: usize,
        observer: &dyn Observer,
    ) -> (AssembledContext, EvidenceMetadata) {
        let report = classify_detailed(query);
        observer.on_event(&RetrievalEvent::Classified {
            query_type: report.classification.query_type().to_string(),
            ambiguous: report.is_ambiguous(),
        });
        let ambiguous = report.is_ambiguous();
        let classification = report.classification;

        if query.trim().is_empty() {
            let mut record = ExecutionRecord::start();
            record.finish(false);
            let mut metadata = EvidenceMetadata::new(classification, ambiguous, record);
            metadata.error = Some("empty query".into());
            let context = self.assemble(history, query, &[], token_budget, observer);
            self.finished(observer, &metadata);
            return (context, metadata);
        }

        let (evidence, metadata) = match self.coordinator.run(&classification, observer).await {
            Ok(envelope) => {
                let evidence = envelope.evidence();
                let mut metadata =
                    EvidenceMetadata::new(classification, ambiguous, envelope.record);
                metadata.variants = envelope.variants;
                metadata.rewrite_fell_back = envelope.rewrite_fell_back;
                metadata.internal_results = envelope.internal.len();
                metadata.external_results = envelope.external.len();
                metadata.sources = evidence.iter().map(|r| r.source.clone()).collect();
                metadata.case_numbers = envelope.case_numbers;
                (evidence, metadata)
            }
            Err(e) => {
                warn!(error = %e, "No evidence source answered, assembling without evidence");
                let mut metadata =
                    EvidenceMetadata::new(classification, ambiguous, e.record().clone());
                metadata.error = Some(e.to_string());
                (Vec::new(), metadata)
            }
        };

        let context = self.assemble(history, query, &evidence, token_budget, observer);
        info!(
            query_type = %metadata.classification.query_type(),
            evidence = evidence.len(),
            final_tokens = context.final_tokens,
            budget = token_budget,
            success = metadata.success,
            "Context ready"
        );
        self.finished(observer, &metadata);
        (context, metadata)
    }

    fn assemble(
        &self,
        history: &[ChatMessage],
        query: &str,
        evidence: &[SearchResult],
        budget: usize,
        observer: &dyn Observer,
    ) -> AssembledContext {
        let context = self.assembler.assemble(&AssemblyInput {
            system_prompt: &self.system_prompt,
            history: earlier_turns(history, query),
            query: Some(query),
            evidence,
            budget,
        });
        observer.on_event(&RetrievalEvent::ContextAssembled {
            original_tokens: context.original_tokens,
            final_tokens: context.final_tokens,
            truncated: context.truncated,
        });
        context
    }

    fn finished(&self, observer: &dyn Observer, metadata: &EvidenceMetadata) {
        observer.on_event(&RetrievalEvent::Finished {
            success: metadata.success,
            execution_time_ms: metadata.execution_time_ms,
        });
    }
}

/// `history` without a trailing copy of `query`.
fn earlier_turns<'h>(history: &'h [ChatMessage], query: &str) -> &'h [ChatMessage] {
    match history.split_last() {
        Some((last, earlier))
            if last.role == Role::User && last.content.trim() == query.trim() =>
        {
            earlier
        }
        _ => history,
    }
}
