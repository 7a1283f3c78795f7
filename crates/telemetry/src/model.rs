//! Data model for retrieval events and execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ── Branch ────────────────────────────────────────────────────────────────

/// Which side of the coordinator fan-out a branch belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// Internal orchestrator call.
    Internal,
    /// External web search.
    External,
}

impl BranchKind {
    /// Key used in [`ExecutionRecord::per_branch_counts`].
    pub fn label(&self, variant: usize) -> String {
        format!("{self}:{variant}")
    }
}

impl std::fmt::Display for BranchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

// ── Events ────────────────────────────────────────────────────────────────

/// Something that happened while serving one retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RetrievalEvent {
    /// The query was classified.
    Classified {
        query_type: String,
        /// More than one detector matched; precedence decided.
        ambiguous: bool,
    },

    /// Query variants are ready.
    Rewritten {
        variants: usize,
        /// The original query is the only variant because rewriting failed.
        fell_back: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    BranchStarted {
        kind: BranchKind,
        variant: usize,
    },

    BranchFinished {
        kind: BranchKind,
        variant: usize,
        results: usize,
        elapsed_ms: u64,
    },

    BranchFailed {
        kind: BranchKind,
        variant: usize,
        error: String,
        elapsed_ms: u64,
    },

    /// Evidence merged and deduplicated.
    EvidenceMerged {
        internal: usize,
        external: usize,
        case_numbers: usize,
    },

    ContextAssembled {
        original_tokens: usize,
        final_tokens: usize,
        truncated: bool,
    },

    /// The request finished.
    Finished {
        success: bool,
        execution_time_ms: u64,
    },
}

impl RetrievalEvent {
    /// Short name of the event variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classified { .. } => "classified",
            Self::Rewritten { .. } => "rewritten",
            Self::BranchStarted { .. } => "branch_started",
            Self::BranchFinished { .. } => "branch_finished",
            Self::BranchFailed { .. } => "branch_failed",
            Self::EvidenceMerged { .. } => "evidence_merged",
            Self::ContextAssembled { .. } => "context_assembled",
            Self::Finished { .. } => "finished",
        }
    }
}

// ── Execution record ──────────────────────────────────────────────────────

/// Timing and outcome of one coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique identifier.
    pub id: String,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// Wall-clock duration (set on finish).
    pub execution_time_ms: u64,
    /// Results contributed per branch, keyed `kind:variant`.
    pub per_branch_counts: BTreeMap<String, usize>,
    /// Branches that failed, keyed `kind:variant`, with the error.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
    pub success: bool,
}

impl ExecutionRecord {
    /// Start a new record now.
    pub fn start() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            execution_time_ms: 0,
            per_branch_counts: BTreeMap::new(),
            failures: BTreeMap::new(),
            success: false,
        }
    }

    pub fn record_branch(&mut self, kind: BranchKind, variant: usize, results: usize) {
        self.per_branch_counts.insert(kind.label(variant), results);
    }

    pub fn record_failure(&mut self, kind: BranchKind, variant: usize, error: impl Into<String>) {
        self.per_branch_counts.insert(kind.label(variant), 0);
        self.failures.insert(kind.label(variant), error.into());
    }

    /// Mark the record as finished.
    pub fn finish(&mut self, success: bool) {
        self.execution_time_ms = Utc::now()
            .signed_duration_since(self.start_time)
            .num_milliseconds()
            .max(0) as u64;
        self.success = success;
    }

    /// Total results across all branches.
    pub fn total_results(&self) -> usize {
        self.per_branch_counts.values().sum()
    }

    /// Results from branches of one kind.
    pub fn results_of(&self, kind: BranchKind) -> usize {
        let prefix = format!("{kind}:");
        self.per_branch_counts
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v)
            .sum()
    }
}
