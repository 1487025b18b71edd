//! Retrieval-augmented answers over the vector index.
pub mod context;
pub mod engine;

pub use engine::{ChatAnswer, PreparedQuery, QueryAnswer, RagConfig, RagEngine, RagError, SourceRef};
