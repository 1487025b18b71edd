use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::indexer::chunk::{Chunk, ChunkMetadata, MetaValue};

pub const COSINE: &str = "cosine";

/// Exact-match predicate over record metadata keys.
pub type MetadataFilter = BTreeMap<String, MetaValue>;

/// A named collection and the embedding configuration it is bound to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub distance_metric: String,
}

impl Collection {
    /// Name of the vec0 table holding this collection's vectors.
    pub(crate) fn vec_table(&self) -> String {
        format!("vec_records_{}", self.id)
    }
}

/// Metadata persisted with every record: chunk identity plus everything the
/// chunker and ingestion attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub chunk_type: String,
    #[serde(flatten)]
    pub chunk: ChunkMetadata,
}

impl From<&Chunk> for RecordMetadata {
    fn from(c: &Chunk) -> Self {
        Self {
            file_path: c.file_path.clone(),
            start_line: c.start_line,
            end_line: c.end_line,
            language: c.language.clone(),
            chunk_type: c.chunk_type.clone(),
            chunk: c.metadata.clone(),
        }
    }
}

impl RecordMetadata {
    pub fn line_range(&self) -> String {
        format!("{}-{}", self.start_line, self.end_line)
    }
}

/// A record ready to be written.
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub record_id: String,
    pub content: &'a str,
    pub metadata: RecordMetadata,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: RecordMetadata,
    /// `1 - cosine distance`; 1.0 is identical direction.
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub embedding_model: String,
    pub distance_metric: String,
    pub location: String,
    pub total_records: usize,
    pub languages: BTreeMap<String, usize>,
    pub chunk_types: BTreeMap<String, usize>,
    /// Distributions were computed from a sample rather than every record.
    pub sampled: bool,
    pub sample_size: usize,
}
