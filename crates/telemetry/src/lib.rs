//! Request-scoped observability for LexRAG.
//!
//! Retrieval components report [`RetrievalEvent`]s to an injected
//! [`Observer`]; the coordinator summarizes each run in an
//! [`ExecutionRecord`].

pub mod collector;
pub mod model;

pub use collector::{EventCollector, Fanout, NoopObserver, Observer, RecordedEvent, TracingObserver};
pub use model::{BranchKind, ExecutionRecord, RetrievalEvent};
