//! Retrieve → filter → format → prompt → generate.
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::context::{SYSTEM_PROMPT, build_prompt, chat_system_message, format_context};
use crate::db::{IndexError, SearchHit, VectorIndex};
use crate::llm::{GenerationParams, Generator, LlmError, Message, Role};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.3;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("retrieval failed: {0}")]
    Index(#[from] IndexError),

    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("conversation has no user message")]
    EmptyConversation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RagConfig {
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub generation: GenerationParams,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            generation: GenerationParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub file: String,
    pub line_range: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub num_sources: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Everything a single-turn query sends to the model, before generation.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub hits: Vec<SearchHit>,
    pub context: String,
    pub prompt: String,
}

/// Answers questions about an indexed repository. The backend is fixed at
/// construction; nothing in the query path depends on which one it is.
pub struct RagEngine<G> {
    index: VectorIndex,
    generator: G,
    config: RagConfig,
}

impl<G: Generator> RagEngine<G> {
    pub fn new(index: VectorIndex, generator: G, config: RagConfig) -> Self {
        Self {
            index,
            generator,
            config,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Search, then drop hits below the similarity threshold.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RagError> {
        let mut hits = self.index.search(query, k, None).await?;
        let found = hits.len();
        hits.retain(|h| h.similarity >= self.config.similarity_threshold);
        debug!(
            "Retrieved {found} snippets, {} above threshold {}",
            hits.len(),
            self.config.similarity_threshold
        );
        Ok(hits)
    }

    pub async fn prepare(&self, question: &str, k: Option<usize>) -> Result<PreparedQuery, RagError> {
        let hits = self.retrieve(question, k.unwrap_or(self.config.top_k)).await?;
        let context = format_context(&hits);
        let prompt = build_prompt(question, &context);
        Ok(PreparedQuery {
            hits,
            context,
            prompt,
        })
    }

    /// Single-turn question answering.
    pub async fn query(&self, question: &str, k: Option<usize>) -> Result<QueryAnswer, RagError> {
        info!("Processing query: {question}");
        let prepared = self.prepare(question, k).await?;

        let messages = [Message::system(SYSTEM_PROMPT), Message::user(prepared.prompt)];
        let answer = self
            .generator
            .generate(&messages, &self.config.generation)
            .await?;

        let sources: Vec<SourceRef> = prepared
            .hits
            .iter()
            .map(|h| SourceRef {
                file: h.metadata.file_path.clone(),
                line_range: h.metadata.line_range(),
                similarity: h.similarity,
            })
            .collect();

        Ok(QueryAnswer {
            question: question.to_string(),
            answer,
            num_sources: sources.len(),
            sources,
        })
    }

    /// Multi-turn chat. Retrieval uses only the latest user message; the
    /// context goes in a leading system message ahead of the full history.
    pub async fn chat(&self, history: &[Message], k: Option<usize>) -> Result<ChatAnswer, RagError> {
        let latest = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or(RagError::EmptyConversation)?;

        let hits = self
            .retrieve(&latest.content, k.unwrap_or(self.config.top_k))
            .await?;
        let context = format_context(&hits);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(chat_system_message(&context)));
        messages.extend_from_slice(history);

        let answer = self
            .generator
            .generate(&messages, &self.config.generation)
            .await?;

        Ok(ChatAnswer {
            answer,
            sources: hits.into_iter().map(|h| h.metadata.file_path).collect(),
        })
    }
}
