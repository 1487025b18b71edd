use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::chunker::Chunker;
use super::git::GitInfo;
use super::ingest::{IngestError, IngestStats, Ingestor};
use super::progress::ProgressHandle;
use crate::config::Config;
use crate::db::{IndexError, VectorIndex};

/// What to do when one insert batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchErrorPolicy {
    /// Stop the run and report the error. Earlier batches stay stored.
    #[default]
    Abort,
    /// Log the failure, count it, and continue with the next batch.
    Skip,
}

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("indexing failed: {0}")]
    Index(#[from] IndexError),

    #[error("ingestion task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub repo: GitInfo,
    pub stats: IngestStats,
    pub batches_total: usize,
    pub batches_inserted: usize,
    pub batches_failed: usize,
    pub chunks_indexed: usize,
    pub cancelled: bool,
}

/// Ingests a repository and feeds its chunks into the vector index in
/// batches.
#[derive(Clone)]
pub struct Indexer {
    index: VectorIndex,
    ingestor: Ingestor,
    batch_size: usize,
    policy: BatchErrorPolicy,
}

impl Indexer {
    pub fn new(
        index: VectorIndex,
        ingestor: Ingestor,
        batch_size: usize,
        policy: BatchErrorPolicy,
    ) -> Self {
        Self {
            index,
            ingestor,
            batch_size: batch_size.max(1),
            policy,
        }
    }

    pub fn from_config(index: VectorIndex, config: &Config) -> Self {
        let ingestor = Ingestor::new(Chunker::new(config.chunk_size), &config.ingestion);
        Self::new(
            index,
            ingestor,
            config.batch_size,
            config.batch_error_policy,
        )
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Index everything under `root`.
    ///
    /// Chunking accounts for the first half of the reported progress, insert
    /// batches for the second. `cancel` is checked between batches; batches
    /// already inserted stay in the index.
    pub async fn index_repository(
        &self,
        root: &Path,
        progress: Option<&ProgressHandle>,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, IndexerError> {
        if let Some(p) = progress {
            p.start(format!("Chunking {}", root.display()));
        }

        let ingestor = self.ingestor.clone();
        let root_buf: PathBuf = root.to_path_buf();
        let ingested = match tokio::task::spawn_blocking(move || ingestor.ingest(&root_buf)).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                if let Some(p) = progress {
                    p.fail(e.to_string());
                }
                return Err(e.into());
            }
            Err(e) => {
                if let Some(p) = progress {
                    p.fail(e.to_string());
                }
                return Err(e.into());
            }
        };

        let chunks = ingested.chunks;
        let batches_total = chunks.len().div_ceil(self.batch_size);
        if let Some(p) = progress {
            p.record_counts(
                ingested.stats.files_processed,
                ingested.stats.chunks_created,
                ingested.stats.errors,
            );
            p.set_progress(
                50,
                format!(
                    "Chunked {} files into {} chunks",
                    ingested.stats.files_processed,
                    chunks.len()
                ),
            );
        }

        let mut report = IndexReport {
            repo: ingested.repo,
            stats: ingested.stats,
            batches_total,
            batches_inserted: 0,
            batches_failed: 0,
            chunks_indexed: 0,
            cancelled: false,
        };

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.index.insert(batch).await {
                Ok(stored) => {
                    report.batches_inserted += 1;
                    report.chunks_indexed += stored;
                }
                Err(e) => match self.policy {
                    BatchErrorPolicy::Abort => {
                        if let Some(p) = progress {
                            p.fail(format!("Batch {}/{batches_total} failed: {e}", i + 1));
                        }
                        return Err(e.into());
                    }
                    BatchErrorPolicy::Skip => {
                        warn!("Skipping batch {}/{batches_total}: {e}", i + 1);
                        report.batches_failed += 1;
                    }
                },
            }

            if let Some(p) = progress {
                let done = i + 1;
                let percent = 50 + (50 * done / batches_total) as u8;
                p.set_progress(percent, format!("Inserted batch {done}/{batches_total}"));
            }
        }

        info!(
            "Indexed {}: {} chunks in {}/{} batches ({} failed){}",
            report.repo.repo_name,
            report.chunks_indexed,
            report.batches_inserted,
            batches_total,
            report.batches_failed,
            if report.cancelled { ", cancelled" } else { "" }
        );

        if let Some(p) = progress {
            if report.cancelled {
                p.cancel(format!(
                    "Cancelled after {}/{batches_total} batches",
                    report.batches_inserted
                ));
            } else {
                p.complete(format!(
                    "Indexed {} chunks from {} files",
                    report.chunks_indexed, report.stats.files_processed
                ));
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::embedder::mock::MockEmbedder;
    use crate::embedder::{Embedder, EmbedderError};
    use crate::indexer::ingest::IngestOptions;
    use crate::indexer::progress::{TaskRegistry, TaskState};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::sync::Mutex as TokioMutex;

    /// Fails every batch that contains the word "boom".
    struct FlakyEmbedder(MockEmbedder);

    impl Embedder for FlakyEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            if text.contains("boom") {
                return Err(EmbedderError::InferenceFailed("boom".to_string()));
            }
            self.0.embed(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimensions(&self) -> usize {
            self.0.dimensions()
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    async fn indexer(
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        policy: BatchErrorPolicy,
    ) -> Indexer {
        let db = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
        let index = VectorIndex::open(db, embedder, "test").await.unwrap();
        let ingestor = Ingestor::new(Chunker::default(), &IngestOptions::default());
        Indexer::new(index, ingestor, batch_size, policy)
    }

    fn write_repo(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_index_repository_reports_progress() {
        let repo = write_repo(&[
            ("a.py", "def alpha():\n    return 1\n"),
            ("b.py", "def beta():\n    return 2\n"),
            ("notes.txt", "plain text notes\n"),
        ]);
        let indexer = indexer(Arc::new(MockEmbedder::new(64)), 1, BatchErrorPolicy::Abort).await;
        let registry = TaskRegistry::new();
        let handle = registry.create("queued");

        let report = indexer
            .index_repository(repo.path(), Some(&handle), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.stats.files_processed, 3);
        assert_eq!(report.batches_total, 3);
        assert_eq!(report.batches_inserted, 3);
        assert_eq!(report.chunks_indexed, 3);
        assert!(!report.cancelled);
        assert_eq!(indexer.index().count().await.unwrap(), 3);

        let status = handle.status().unwrap();
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.files_processed, 3);
        assert_eq!(status.chunks_created, 3);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let repo = write_repo(&[("a.py", "def alpha():\n    return 1\n")]);
        let indexer = indexer(Arc::new(MockEmbedder::new(64)), 10, BatchErrorPolicy::Abort).await;
        let token = CancellationToken::new();

        indexer.index_repository(repo.path(), None, &token).await.unwrap();
        indexer.index_repository(repo.path(), None, &token).await.unwrap();
        assert_eq!(indexer.index().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let repo = write_repo(&[("a.py", "def alpha():\n    return 1\n")]);
        let indexer = indexer(Arc::new(MockEmbedder::new(64)), 1, BatchErrorPolicy::Abort).await;
        let registry = TaskRegistry::new();
        let handle = registry.create("queued");
        let token = CancellationToken::new();
        token.cancel();

        let report = indexer
            .index_repository(repo.path(), Some(&handle), &token)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.batches_inserted, 0);
        assert_eq!(indexer.index().count().await.unwrap(), 0);
        assert_eq!(handle.status().unwrap().state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_skip_policy_continues_past_failed_batch() {
        let repo = write_repo(&[
            ("a.py", "def alpha():\n    return 1\n"),
            ("b.py", "def boom():\n    raise Exception\n"),
            ("c.py", "def gamma():\n    return 3\n"),
        ]);
        let embedder = Arc::new(FlakyEmbedder(MockEmbedder::new(64)));
        let indexer = indexer(embedder, 1, BatchErrorPolicy::Skip).await;

        let report = indexer
            .index_repository(repo.path(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.batches_inserted, 2);
        assert_eq!(indexer.index().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_run() {
        let repo = write_repo(&[
            ("a.py", "def alpha():\n    return 1\n"),
            ("b.py", "def boom():\n    raise Exception\n"),
            ("c.py", "def gamma():\n    return 3\n"),
        ]);
        let embedder = Arc::new(FlakyEmbedder(MockEmbedder::new(64)));
        let indexer = indexer(embedder, 1, BatchErrorPolicy::Abort).await;
        let registry = TaskRegistry::new();
        let handle = registry.create("queued");

        let err = indexer
            .index_repository(repo.path(), Some(&handle), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Index(_)));
        // Files are walked in name order, so a.py went in before the failure.
        assert_eq!(indexer.index().count().await.unwrap(), 1);
        assert_eq!(handle.status().unwrap().state, TaskState::Failed);
    }

    #[tokio::test]
    async fn test_missing_root_fails_task() {
        let indexer = indexer(Arc::new(MockEmbedder::new(64)), 10, BatchErrorPolicy::Abort).await;
        let registry = TaskRegistry::new();
        let handle = registry.create("queued");

        let err = indexer
            .index_repository(
                Path::new("/definitely/not/here"),
                Some(&handle),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Ingest(_)));
        assert_eq!(handle.status().unwrap().state, TaskState::Failed);
    }
}
