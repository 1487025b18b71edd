//! The vector index: chunks in, ranked chunks out.
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use super::models::{Collection, CollectionStats, MetadataFilter, NewRecord, RecordMetadata, SearchHit};
use super::search::STATS_SAMPLE_LIMIT;
use super::{Db, DbError};
use crate::embedder::{Embedder, EmbedderError};
use crate::indexer::chunk::Chunk;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("embedder returned {actual} vectors for {expected} texts")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("embedding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A collection plus the embedder bound to it. Cheap to clone; clones share
/// the same connection and embedder.
#[derive(Clone)]
pub struct VectorIndex {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    collection: Collection,
}

impl VectorIndex {
    /// Open (or create) `collection_name` bound to the embedder's model.
    pub async fn open(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        collection_name: &str,
    ) -> Result<Self, IndexError> {
        let collection = {
            let guard = db.lock().await;
            guard.open_collection(
                collection_name,
                embedder.model_name(),
                embedder.dimensions(),
            )?
        };
        Ok(Self {
            db,
            embedder,
            collection,
        })
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Embed and store one batch. The batch is written atomically; on error
    /// nothing from it is stored.
    pub async fn insert(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
        let embeddings = self.embed_texts(texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(IndexError::EmbeddingCount {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let records: Vec<NewRecord<'_>> = chunks
            .iter()
            .map(|c| NewRecord {
                record_id: c.record_id(),
                content: &c.content,
                metadata: RecordMetadata::from(c),
            })
            .collect();

        let stored = {
            let mut guard = self.db.lock().await;
            guard.upsert_records(&self.collection, &records, &embeddings)?
        };
        debug!("Stored {stored} records in '{}'", self.collection.name);
        Ok(stored)
    }

    /// Up to `k` results by descending similarity. An empty collection gives
    /// an empty list without embedding the query.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self.embed_texts(vec![query.to_string()]).await?;
        let query_vector = vectors.pop().ok_or(IndexError::EmbeddingCount {
            expected: 1,
            actual: 0,
        })?;

        let guard = self.db.lock().await;
        Ok(guard.search(&self.collection, &query_vector, k, filter)?)
    }

    /// Search restricted to chunks of one file.
    pub async fn search_by_file(
        &self,
        query: &str,
        file_path: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let mut filter = MetadataFilter::new();
        filter.insert("file_path".to_string(), file_path.into());
        self.search(query, k, Some(&filter)).await
    }

    pub async fn count(&self) -> Result<usize, IndexError> {
        let guard = self.db.lock().await;
        Ok(guard.count_records(&self.collection)?)
    }

    pub async fn statistics(&self) -> Result<CollectionStats, IndexError> {
        let guard = self.db.lock().await;
        Ok(guard.collection_stats(&self.collection, STATS_SAMPLE_LIMIT)?)
    }

    /// Remove every record; the collection keeps its name and binding.
    pub async fn clear(&self) -> Result<(), IndexError> {
        let mut guard = self.db.lock().await;
        guard.clear_collection(&self.collection)?;
        info!("Index '{}' cleared", self.collection.name);
        Ok(())
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, IndexError> {
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs)
        })
        .await??;
        Ok(vectors)
    }
}
