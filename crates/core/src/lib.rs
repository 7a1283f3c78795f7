//! # LexRAG Core
//!
//! Domain types, collaborator traits, and error definitions for the LexRAG
//! legal retrieval core. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (search backend, web-search provider, text
//! generator) is a trait here. Implementations live in their respective
//! crates and are injected as `Arc<dyn Trait>` handles built once at startup.

pub mod backend;
pub mod error;
pub mod message;
pub mod provider;
pub mod query;
pub mod result;

// Re-export key types at crate root for ergonomics
pub use backend::{Clause, FieldBoost, QuerySpec, RawHit, SearchBackend};
pub use error::{ProviderError, SearchError, TokenizerError};
pub use message::{ChatMessage, ContextMessage, Role};
pub use provider::{TextGenerator, WebHit, WebSearchProvider};
pub use query::{
    CaseNumber, CompanyEntity, DocTypeEntity, Entities, QueryClassification, QueryType,
    RegistrationKind, RegistrationNumber,
};
pub use result::{Provenance, ResultKey, ResultSet, SearchResult, Source, truncate_chars};
