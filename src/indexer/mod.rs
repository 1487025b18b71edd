//! Repository ingestion: file discovery, chunking, and the end-to-end
//! indexing run that feeds chunks into the vector index.
pub mod chunk;
pub mod chunker;
pub mod core;
pub mod git;
pub mod ingest;
pub mod languages;
pub mod progress;

pub use chunk::{Chunk, ChunkMetadata, FileContext, MetaValue};
pub use chunker::Chunker;
pub use self::core::{BatchErrorPolicy, IndexReport, Indexer, IndexerError};
pub use ingest::{IngestError, IngestOptions, IngestOutput, IngestStats, Ingestor};
pub use languages::Lang;
pub use progress::{ProgressHandle, TaskId, TaskRegistry, TaskState, TaskStatus};
