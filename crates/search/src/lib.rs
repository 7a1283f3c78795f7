//! # LexRAG Search
//!
//! The cascading search orchestrator and the backends it runs against.
//!
//! - [`orchestrator`]: strategy routing, fallback and per-call timeouts
//! - [`strategies`]: query construction and result post-processing
//! - [`collections`]: per-collection adapters from raw hits to results
//! - [`elastic`]: Elasticsearch/OpenSearch `_search` backend
//! - [`memory`]: in-process backend for tests and local runs

pub mod collections;
pub mod elastic;
pub mod memory;
pub mod orchestrator;
pub mod strategies;

pub use collections::{CollectionAdapter, CollectionCatalog};
pub use elastic::ElasticsearchBackend;
pub use memory::InMemoryBackend;
pub use orchestrator::{CollectionAttempt, OrchestratorSettings, SearchOrchestrator, SearchOutcome};
pub use strategies::allocate;

use lexrag_config::SearchConfig;
use lexrag_core::{SearchBackend, SearchError};
use std::sync::Arc;

/// Create the configured search backend.
pub fn create_backend(config: &SearchConfig) -> Result<Arc<dyn SearchBackend>, SearchError> {
    match config.backend.as_str() {
        "memory" => {
            let backend = match &config.seed_file {
                Some(path) => InMemoryBackend::from_file(path)?,
                None => InMemoryBackend::new(),
            };
            Ok(Arc::new(backend))
        }
        _ => {
            let mut backend = ElasticsearchBackend::new(&config.url);
            if let Some(user) = &config.username {
                backend = backend.with_basic_auth(user, config.password.clone());
            }
            Ok(Arc::new(backend))
        }
    }
}
