//! Token-budgeted context assembly for LexRAG.
//!
//! The [`ContextAssembler`] packs the system prompt, merged evidence and
//! chat history into an ordered, role-valid message list that fits a token
//! budget. Token counts come from a [`TokenCounter`].

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyInput, AssemblyMetadata, ContextAssembler, DropInfo,
    EVIDENCE_HEADER, EvidencePolicy, LayerStats,
};
pub use token::{HeuristicTokenizer, MESSAGE_OVERHEAD, TokenCounter, Tokenizer};

#[cfg(feature = "tiktoken")]
pub use token::TiktokenTokenizer;
