/// Configuration module for coderag.
///
/// Handles loading, validating, and providing default configuration values,
/// plus the API credentials picked up from the environment.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedder::download::{all_files_present, default_model_dir, download_model_files};
use crate::embedder::mock::MockEmbedder;
use crate::embedder::onnx::{MODEL_DIMENSIONS, MODEL_NAME, OnnxEmbedder};
use crate::embedder::Embedder;
use crate::indexer::chunker::DEFAULT_CHUNK_SIZE;
use crate::indexer::{BatchErrorPolicy, IngestOptions};
use crate::llm::GenerationParams;
use crate::rag::RagConfig;
use crate::rag::engine::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

pub const GROQ_API_KEY_VAR: &str = "GROQ_API_KEY";
pub const ANTHROPIC_API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./vectorstore/coderag.db".to_string()
}

fn default_collection_name() -> String {
    "codebase_embeddings".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_batch_size() -> usize {
    1000
}

fn default_model_name() -> String {
    MODEL_NAME.to_string()
}

fn default_dimensions() -> usize {
    MODEL_DIMENSIONS
}

fn default_embedding_model_dir() -> String {
    default_model_dir().to_string_lossy().into_owned()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_temperature() -> f32 {
    GenerationParams::default().temperature
}

fn default_max_tokens() -> u32 {
    GenerationParams::default().max_tokens
}

fn default_groq_model() -> String {
    crate::llm::groq::DEFAULT_MODEL.to_string()
}

fn default_anthropic_model() -> String {
    crate::llm::claude::DEFAULT_MODEL.to_string()
}

fn default_groq_base_url() -> String {
    crate::llm::groq::DEFAULT_BASE_URL.to_string()
}

fn default_anthropic_base_url() -> String {
    crate::llm::claude::DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks per embed-and-insert batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub batch_error_policy: BatchErrorPolicy,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub ingestion: IngestOptions,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// all-MiniLM-L6-v2 through ONNX Runtime.
    #[default]
    Onnx,
    /// Feature hashing; no model files needed.
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    #[serde(default = "default_model_name")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embedding_model_dir")]
    pub model_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LlmConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_groq_model")]
    pub groq_model: String,

    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    #[serde(default = "default_groq_base_url")]
    pub groq_base_url: String,

    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// API keys. Never serialized.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub groq_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            collection_name: default_collection_name(),
            chunk_size: default_chunk_size(),
            batch_size: default_batch_size(),
            batch_error_policy: BatchErrorPolicy::default(),
            embedding: EmbeddingConfig::default(),
            ingestion: IngestOptions::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: default_model_name(),
            dimensions: default_dimensions(),
            model_dir: default_embedding_model_dir(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            groq_model: default_groq_model(),
            anthropic_model: default_anthropic_model(),
            groq_base_url: default_groq_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(
            !self.collection_name.trim().is_empty(),
            "collection_name must not be empty"
        );
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        if self.embedding.backend == EmbeddingBackend::Onnx {
            anyhow::ensure!(
                self.embedding.dimensions == MODEL_DIMENSIONS,
                "embedding.dimensions must be {MODEL_DIMENSIONS} for the onnx backend"
            );
            anyhow::ensure!(
                self.embedding.model == MODEL_NAME,
                "embedding.model must be {MODEL_NAME} for the onnx backend, got {}",
                self.embedding.model
            );
        }
        anyhow::ensure!(
            !self.ingestion.supported_extensions.is_empty(),
            "at least one supported extension must be specified"
        );
        anyhow::ensure!(
            self.ingestion.max_file_size > 0,
            "ingestion.max_file_size must be positive"
        );
        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be positive");
        anyhow::ensure!(
            (-1.0..=1.0).contains(&self.retrieval.similarity_threshold),
            "retrieval.similarity_threshold must be within [-1, 1]"
        );
        anyhow::ensure!(self.llm.max_tokens > 0, "llm.max_tokens must be positive");
        anyhow::ensure!(
            self.llm.request_timeout_secs > 0,
            "llm.request_timeout_secs must be positive"
        );
        Ok(())
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from(&self.embedding.model_dir)
    }

    #[must_use]
    pub fn rag_config(&self) -> RagConfig {
        RagConfig {
            top_k: self.retrieval.top_k,
            similarity_threshold: self.retrieval.similarity_threshold,
            generation: GenerationParams {
                temperature: self.llm.temperature,
                max_tokens: self.llm.max_tokens,
            },
        }
    }

    /// Build the configured embedder. The ONNX backend fetches its model
    /// files first when they are missing, so call this off the async runtime.
    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        match self.embedding.backend {
            EmbeddingBackend::Mock => Ok(Arc::new(MockEmbedder::new(self.embedding.dimensions))),
            EmbeddingBackend::Onnx => {
                let dir = self.model_dir();
                if !all_files_present(&dir) {
                    info!("Model files missing in {}, downloading", dir.display());
                    download_model_files(&dir)?;
                }
                let embedder = OnnxEmbedder::new(&dir)
                    .with_context(|| format!("failed to load model from {}", dir.display()))?;
                Ok(Arc::new(embedder))
            }
        }
    }
}

impl Credentials {
    /// Read keys through `lookup`. Blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            groq_api_key: read(GROQ_API_KEY_VAR),
            anthropic_api_key: read(ANTHROPIC_API_KEY_VAR),
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.groq_api_key.is_none() && self.anthropic_api_key.is_none()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("groq_api_key", &mask(&self.groq_api_key))
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
