//! MCP service: the index and the RAG engine exposed as tools over stdio.
pub mod server;
pub mod tools;

pub use server::{McpContext, McpServer};
