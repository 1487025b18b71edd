/// MCP Tool handlers for coderag.
///
/// 1. search             – semantic search over indexed code
/// 2. ask                – answer a question from retrieved code
/// 3. chat               – multi-turn conversation grounded in the code
/// 4. ingest_repository  – index a repository in the background
/// 5. ingestion_status   – poll a background ingestion
/// 6. stats              – collection statistics
/// 7. reset              – remove everything from the collection
use std::path::Path;

use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{error, info};

use crate::db::MetadataFilter;
use crate::indexer::TaskId;
use crate::llm::Message;
use crate::mcp::server::McpContext;

const NOT_INITIALIZED: &str =
    "RAG engine not initialized: set GROQ_API_KEY or ANTHROPIC_API_KEY and restart";

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Search query (natural language or code)
    query: String,
    /// Max results (default: 5)
    top_k: Option<usize>,
    /// Only return chunks from this repository-relative file
    file_path: Option<String>,
    /// Only return chunks in this language (e.g. 'python')
    language: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct AskParams {
    /// Question about the codebase
    question: String,
    /// Snippets to retrieve (default: 5)
    top_k: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
struct ChatParams {
    /// Conversation so far, oldest first; the last user message is answered
    messages: Vec<Message>,
    /// Snippets to retrieve (default: 5)
    top_k: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
struct IngestParams {
    /// Repository root directory
    path: String,
    /// Extra ignore patterns (substrings of the relative path)
    ignore_patterns: Option<Vec<String>>,
}

#[derive(Deserialize, JsonSchema)]
struct StatusParams {
    /// Task id returned by ingest_repository (all tasks if omitted)
    task_id: Option<u64>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, McpError> {
    serde_json::to_value(value)
        .map_err(|e| McpError::internal_error(format!("serialization failed: {e}"), None))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: search ──────────────────────────────────────────────

    #[tool(
        description = "Semantic search over the indexed repository. Returns code chunks ranked by similarity, optionally restricted to one file or language."
    )]
    async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }
        let top_k = p.top_k.unwrap_or(self.ctx.config.retrieval.top_k);

        let mut filter = MetadataFilter::new();
        if let Some(file) = &p.file_path {
            filter.insert("file_path".to_string(), file.as_str().into());
        }
        if let Some(lang) = &p.language {
            filter.insert("language".to_string(), lang.as_str().into());
        }
        let filter_ref = if filter.is_empty() { None } else { Some(&filter) };

        let hits = self
            .ctx
            .index
            .search(&p.query, top_k, filter_ref)
            .await
            .map_err(|e| McpError::internal_error(format!("search failed: {e}"), None))?;

        let results: Vec<serde_json::Value> = hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "file_path": h.metadata.file_path,
                    "lines": h.metadata.line_range(),
                    "language": h.metadata.language,
                    "chunk_type": h.metadata.chunk_type,
                    "name": h.metadata.chunk.name,
                    "similarity": h.similarity,
                    "content": h.content,
                })
            })
            .collect();

        json_result(serde_json::json!({ "query": p.query, "results": results }))
    }

    // ── Tool 2: ask ─────────────────────────────────────────────────

    #[tool(description = "Answer a question about the codebase using retrieved code as context")]
    async fn ask(&self, params: Parameters<AskParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.question.trim().is_empty() {
            return error_result("question is required");
        }
        let Some(engine) = &self.ctx.engine else {
            return error_result(NOT_INITIALIZED);
        };

        match engine.query(&p.question, p.top_k).await {
            Ok(answer) => json_result(to_json(&answer)?),
            Err(e) => error_result(&format!("query failed: {e}")),
        }
    }

    // ── Tool 3: chat ────────────────────────────────────────────────

    #[tool(
        description = "Continue a conversation about the codebase. Context is retrieved for the latest user message."
    )]
    async fn chat(&self, params: Parameters<ChatParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let Some(engine) = &self.ctx.engine else {
            return error_result(NOT_INITIALIZED);
        };

        match engine.chat(&p.messages, p.top_k).await {
            Ok(answer) => json_result(to_json(&answer)?),
            Err(e) => error_result(&format!("chat failed: {e}")),
        }
    }

    // ── Tool 4: ingest_repository ───────────────────────────────────

    #[tool(
        description = "Index a local repository in the background. Returns a task_id to poll with ingestion_status."
    )]
    async fn ingest_repository(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let root = Path::new(&p.path);
        if !root.is_dir() {
            return error_result(&format!("not a directory: {}", p.path));
        }

        let indexer = self.ctx.indexer(p.ignore_patterns.as_deref().unwrap_or_default());
        let handle = self.ctx.tasks.create(format!("Queued ingestion of {}", p.path));
        let task_id = handle.id();
        let token = self.ctx.shutdown.child_token();
        let root = root.to_path_buf();

        info!("Ingestion task {task_id} started for {}", root.display());
        tokio::spawn(async move {
            if let Err(e) = indexer.index_repository(&root, Some(&handle), &token).await {
                error!("Ingestion task {task_id} failed: {e}");
            }
        });

        json_result(serde_json::json!({
            "task_id": task_id,
            "status": "pending",
            "path": p.path,
        }))
    }

    // ── Tool 5: ingestion_status ────────────────────────────────────

    #[tool(description = "Status of a background ingestion (or all of them)")]
    async fn ingestion_status(
        &self,
        params: Parameters<StatusParams>,
    ) -> Result<CallToolResult, McpError> {
        match params.0.task_id {
            Some(raw) => match self.ctx.tasks.get(TaskId::new(raw)) {
                Some(status) => json_result(to_json(&status)?),
                None => error_result(&format!("unknown task: {raw}")),
            },
            None => json_result(serde_json::json!({ "tasks": to_json(&self.ctx.tasks.list())? })),
        }
    }

    // ── Tool 6: stats ───────────────────────────────────────────────

    #[tool(description = "Collection statistics: record count, languages and chunk types")]
    async fn stats(&self) -> Result<CallToolResult, McpError> {
        let stats = self
            .ctx
            .index
            .statistics()
            .await
            .map_err(|e| McpError::internal_error(format!("stats failed: {e}"), None))?;
        json_result(to_json(&stats)?)
    }

    // ── Tool 7: reset ───────────────────────────────────────────────

    #[tool(description = "Delete every indexed chunk from the collection")]
    async fn reset(&self) -> Result<CallToolResult, McpError> {
        self.ctx
            .index
            .clear()
            .await
            .map_err(|e| McpError::internal_error(format!("reset failed: {e}"), None))?;
        json_result(serde_json::json!({
            "success": true,
            "collection": self.ctx.index.collection().name,
        }))
    }
}
