//! # coderag: question answering over a code repository
//!
//! Splits a repository into definition-level chunks, embeds them into a
//! local vector index, and answers questions with retrieved code as context.
//!
//! ## Architecture
//!
//! - **[`config`]**: configuration loading, validation, credentials
//! - **[`indexer`]**: tree-sitter chunking, repository ingestion, batched indexing runs
//! - **[`embedder`]**: text embedding via ONNX Runtime (all-MiniLM-L6-v2)
//! - **[`db`]**: SQLite + sqlite-vec vector index (insert, search, statistics)
//! - **[`llm`]**: Groq and Anthropic generation backends
//! - **[`rag`]**: retrieval, context formatting, prompting, chat
//! - **[`mcp`]**: MCP server exposing the above as tools (stdio transport via rmcp)

pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
pub mod llm;
pub mod mcp;
pub mod rag;
