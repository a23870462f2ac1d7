//! MCP (Model Context Protocol) Server Implementation
//!
//! Exposes question answering over the tool index to MCP clients,
//! following JSON-RPC 2.0 and MCP protocol version 2025-06-18.

#[cfg(test)]
mod tests;

pub mod protocol;
pub mod server;
pub mod tools;

use std::sync::Arc;

use crate::service::RagService;
use server::McpServer;
use tools::{AskToolsHandler, SearchToolsHandler};

/// Server with both tools registered against `service`
#[inline]
pub async fn build_server(service: Arc<RagService>) -> McpServer {
    let server = McpServer::new(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );

    server
        .register_tool(
            AskToolsHandler::tool_definition(),
            AskToolsHandler::new(Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            SearchToolsHandler::tool_definition(),
            SearchToolsHandler::new(service),
        )
        .await;

    server
}
