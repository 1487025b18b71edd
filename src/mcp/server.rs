/// MCP Server setup using `rmcp` with stdio transport.
///
/// Provides `McpContext` (shared state) and `McpServer` (startup logic).
use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::db::VectorIndex;
use crate::indexer::{Indexer, TaskRegistry};
use crate::llm::Backend;
use crate::mcp::tools::AppTools;
use crate::rag::RagEngine;

/// Shared application context available to all tool handlers.
#[derive(Clone)]
pub struct McpContext {
    pub config: Arc<Config>,
    pub index: VectorIndex,
    /// `None` when no generation credentials were found at startup.
    pub engine: Option<Arc<RagEngine<Backend>>>,
    pub tasks: TaskRegistry,
    /// Parent of every ingestion run's token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl McpContext {
    pub fn new(config: Arc<Config>, index: VectorIndex, backend: Option<Backend>) -> Self {
        let engine = backend
            .map(|b| Arc::new(RagEngine::new(index.clone(), b, config.rag_config())));
        Self {
            config,
            index,
            engine,
            tasks: TaskRegistry::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// An indexer over the shared index, with `extra_ignore` appended to the
    /// configured ignore patterns.
    pub fn indexer(&self, extra_ignore: &[String]) -> Indexer {
        let mut config = (*self.config).clone();
        config
            .ingestion
            .ignore_patterns
            .extend(extra_ignore.iter().cloned());
        Indexer::from_config(self.index.clone(), &config)
    }
}

/// MCP Server wrapping the context and serving via stdio.
#[derive(Clone)]
pub struct McpServer {
    pub ctx: McpContext,
}

impl McpServer {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    /// Serve on stdio until the client disconnects. Running ingestions are
    /// cancelled between batches on the way out.
    pub async fn start(self) -> Result<()> {
        info!("Starting MCP server on stdio...");
        let (stdin, stdout) = stdio();

        let app_tools = AppTools::new(self.ctx.clone());
        let router = Router::new(app_tools.clone()).with_tools(app_tools.tool_router.clone());

        let service = router
            .serve((stdin, stdout))
            .await
            .context("MCP Server encountered an error during stdio transport")?;
        let reason = service.waiting().await.context("MCP Server task failed")?;
        info!("MCP server stopped: {reason:?}");

        self.ctx.shutdown.cancel();
        Ok(())
    }
}
