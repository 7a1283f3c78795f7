//! Retrieval pipeline for LexRAG.
//!
//! - [`QueryRewriter`]: alternate phrasings of a query, best-effort
//! - [`ExternalSearchCoordinator`]: concurrent internal and web search with
//!   partial-failure tolerance
//! - [`RetrievalPipeline`]: the `retrieve_and_assemble` entry point

pub mod coordinator;
pub mod rag;
pub mod rewrite;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use coordinator::{
    CoordinatorError, CoordinatorSettings, EvidenceEnvelope, ExternalSearchCoordinator,
};
pub use rag::{EvidenceMetadata, RetrievalPipeline};
pub use rewrite::{QueryRewriter, RewriteOutcome};
