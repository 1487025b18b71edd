//! Repository walk → chunks.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::chunk::{Chunk, FileContext};
use super::chunker::Chunker;
use super::git::{self, GitInfo};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    "venv",
    "env",
    "build",
    "dist",
    ".pytest_cache",
    ".vscode",
    ".idea",
];

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".jsx", ".ts", ".tsx", ".java", ".cpp", ".c", ".go", ".rs", ".rb", ".php", ".md",
    ".txt", ".json", ".yaml", ".yml", ".toml",
];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Substrings; a path containing any of them is pruned.
    pub ignore_patterns: Vec<String>,
    /// Extensions with or without the leading dot, matched case-insensitively.
    pub supported_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestStats {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestStats {
    fn started() -> Self {
        Self {
            files_discovered: 0,
            files_processed: 0,
            files_skipped: 0,
            chunks_created: 0,
            errors: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn files_per_second(&self) -> f64 {
        let secs = self.duration_secs();
        if secs > 0.0 {
            self.files_processed as f64 / secs
        } else {
            self.files_processed as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutput {
    pub chunks: Vec<Chunk>,
    pub stats: IngestStats,
    pub repo: GitInfo,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    chunker: Chunker,
    ignore_patterns: Vec<String>,
    extensions: Vec<String>,
    max_file_size: u64,
}

impl Ingestor {
    pub fn new(chunker: Chunker, options: &IngestOptions) -> Self {
        Self {
            chunker,
            ignore_patterns: options
                .ignore_patterns
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            extensions: options
                .supported_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .filter(|e| !e.is_empty())
                .collect(),
            max_file_size: options.max_file_size,
        }
    }

    /// Walk `root`, chunk every retained file, and tag each chunk with its
    /// repository context. Unreadable files are counted and skipped.
    pub fn ingest(&self, root: &Path) -> Result<IngestOutput, IngestError> {
        if !root.is_dir() {
            return Err(IngestError::NotADirectory(root.to_path_buf()));
        }

        let repo = git::probe(root);
        info!(
            "Ingesting repository {} (branch: {})",
            repo.repo_name,
            repo.branch.as_deref().unwrap_or("-")
        );

        let mut stats = IngestStats::started();
        let mut chunks = Vec::new();

        for path in self.discover(root) {
            stats.files_discovered += 1;
            let relative = relative_path(root, &path);

            let size = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("Failed to stat {relative}: {e}");
                    stats.errors += 1;
                    continue;
                }
            };
            if size > self.max_file_size {
                debug!("Skipping {relative}: {size} bytes exceeds limit");
                stats.files_skipped += 1;
                continue;
            }

            let content = match read_text(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {relative}: {e}");
                    stats.errors += 1;
                    continue;
                }
            };

            let ctx = FileContext {
                repo_name: repo.repo_name.clone(),
                git_branch: repo.branch.clone(),
                full_path: path.display().to_string(),
                relative_path: relative.clone(),
                file_size: size,
            };

            let mut file_chunks = self.chunker.chunk(&relative, &content);
            for chunk in &mut file_chunks {
                chunk.enrich(&ctx);
            }
            debug!("{relative}: {} chunks", file_chunks.len());

            stats.files_processed += 1;
            stats.chunks_created += file_chunks.len();
            chunks.extend(file_chunks);
        }

        stats.finished_at = Some(Utc::now());
        info!(
            "Ingested {}: {} files, {} chunks, {} skipped, {} errors in {:.2}s ({:.1} files/s)",
            repo.repo_name,
            stats.files_processed,
            stats.chunks_created,
            stats.files_skipped,
            stats.errors,
            stats.duration_secs(),
            stats.files_per_second()
        );

        Ok(IngestOutput {
            chunks,
            stats,
            repo,
        })
    }

    /// Retained files in walk order. Ignored directories are pruned before
    /// the walker descends into them.
    fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let prune_root = root.to_path_buf();
        let patterns = self.ignore_patterns.clone();

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let relative = relative_path(&prune_root, entry.path());
                !is_ignored(&relative, &patterns)
            })
            .build();

        walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Walk error: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| self.is_supported(path))
            .collect()
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

/// Ingest `root` with a default chunker and the given filters.
pub fn ingest(
    root: &Path,
    ignore_patterns: &[String],
    supported_extensions: &[String],
) -> Result<IngestOutput, IngestError> {
    let options = IngestOptions {
        ignore_patterns: ignore_patterns.to_vec(),
        supported_extensions: supported_extensions.to_vec(),
        ..Default::default()
    };
    Ingestor::new(Chunker::default(), &options).ingest(root)
}

fn is_ignored(relative: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| relative.contains(p.as_str()))
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// `/`-separated path of `path` below `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// UTF-8 first, then Latin-1, which maps every byte to a char.
fn read_text(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8(bytes).unwrap_or_else(|e| decode_latin1(e.as_bytes())))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn files(output: &IngestOutput) -> Vec<String> {
        let mut files: Vec<String> = output.chunks.iter().map(|c| c.file_path.clone()).collect();
        files.dedup();
        files
    }

    #[test]
    fn test_ingest_filters_and_enriches() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "app/main.py", b"def main():\n    return 0\n");
        write(root, "app/README.MD", b"# Title\n\nSome docs.\n");
        write(root, "node_modules/lib/index.js", b"function x() {}\n");
        write(root, "build/out.py", b"def generated():\n    pass\n");
        write(root, "image.png", &[0x89, 0x50, 0x4e, 0x47]);

        let output = Ingestor::new(Chunker::default(), &IngestOptions::default())
            .ingest(root)
            .unwrap();

        assert_eq!(files(&output), vec!["app/README.MD", "app/main.py"]);
        assert_eq!(output.stats.files_processed, 2);
        assert_eq!(output.stats.errors, 0);
        assert!(output.stats.finished_at.is_some());
        assert_eq!(output.stats.chunks_created, output.chunks.len());

        let py = output.chunks.iter().find(|c| c.file_path == "app/main.py").unwrap();
        assert_eq!(py.language, "python");
        let meta = &py.metadata;
        assert_eq!(meta.relative_path.as_deref(), Some("app/main.py"));
        assert_eq!(meta.repo_name.as_deref(), Some(output.repo.repo_name.as_str()));
        assert_eq!(meta.file_size, Some(25));
        assert!(meta.full_path.as_deref().unwrap().ends_with("main.py"));
        assert_eq!(meta.name.as_deref(), Some("main"));
    }

    #[test]
    fn test_ignore_is_substring_match() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/keep.py", b"x = 1\n");
        write(root, "src/generated_stuff/skip.py", b"y = 2\n");

        let output = ingest(
            root,
            &["generated".to_string()],
            &["py".to_string()],
        )
        .unwrap();
        assert_eq!(files(&output), vec!["src/keep.py"]);
    }

    #[test]
    fn test_latin1_fallback_decoding() {
        let dir = tempdir().unwrap();
        write(dir.path(), "legacy.txt", b"caf\xe9 au lait");

        let output = ingest(dir.path(), &[], &[".txt".to_string()]).unwrap();
        assert_eq!(output.stats.errors, 0);
        assert_eq!(output.chunks.len(), 1);
        assert_eq!(output.chunks[0].content, "café au lait");
    }

    #[test]
    fn test_oversized_files_are_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "big.txt", &vec![b'a'; 64]);
        write(dir.path(), "small.txt", b"ok");

        let options = IngestOptions {
            max_file_size: 10,
            ..Default::default()
        };
        let output = Ingestor::new(Chunker::default(), &options)
            .ingest(dir.path())
            .unwrap();
        assert_eq!(files(&output), vec!["small.txt"]);
        assert_eq!(output.stats.files_skipped, 1);
        assert_eq!(output.stats.errors, 0);
        assert_eq!(output.stats.files_discovered, 2);
    }

    #[test]
    fn test_empty_files_produce_no_chunks() {
        let dir = tempdir().unwrap();
        write(dir.path(), "empty.py", b"");

        let output = ingest(dir.path(), &[], &["py".to_string()]).unwrap();
        assert!(output.chunks.is_empty());
        assert_eq!(output.stats.files_processed, 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ingest(&dir.path().join("nope"), &[], &[]).unwrap_err();
        assert!(matches!(err, IngestError::NotADirectory(_)));
    }

    #[test]
    fn test_throughput_uses_duration() {
        let mut stats = IngestStats::started();
        stats.files_processed = 10;
        stats.finished_at = Some(stats.started_at + chrono::Duration::seconds(2));
        assert!((stats.duration_secs() - 2.0).abs() < 1e-9);
        assert!((stats.files_per_second() - 5.0).abs() < 1e-9);
    }
}
