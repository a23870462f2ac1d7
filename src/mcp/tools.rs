//! MCP Tools Implementation
//!
//! Tool definitions and handlers for asking questions about tools and for
//! raw retrieval over the tool index.

use crate::database::RetrievedChunk;
use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use crate::service::{AskOutcome, RagService};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Upper bound for `top_k` and `limit`
pub const MAX_RESULTS: usize = 100;

/// Question answering tool handler
pub struct AskToolsHandler {
    service: Arc<RagService>,
}

/// Raw retrieval tool handler
pub struct SearchToolsHandler {
    service: Arc<RagService>,
}

impl AskToolsHandler {
    #[inline]
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service }
    }

    /// Create the ask_tools tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "ask_tools".to_string(),
            description: Some(
                "Ask a question about bioinformatics software tools indexed from bio.tools"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Question to answer"
                    },
                    "top_k": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_RESULTS,
                        "description": "Optional: Number of tool chunks to retrieve (default: 3)"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AskToolsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_query(&args)?;
        let top_k = optional_count(&args, "top_k")?;

        debug!("Asking: query='{}', top_k={:?}", query, top_k);

        let outcome = self.service.ask(query, top_k).await?;
        Ok(CallToolResult::text(format_answer(&outcome)))
    }
}

impl SearchToolsHandler {
    #[inline]
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service }
    }

    /// Create the search_tools tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "search_tools".to_string(),
            description: Some("Search the tool index without generating an answer".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_RESULTS,
                        "description": "Maximum number of results (default: 5)"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchToolsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_query(&args)?;
        let limit = optional_count(&args, "limit")?.unwrap_or(DEFAULT_SEARCH_LIMIT);

        debug!("Searching tools: query='{}', limit={}", query, limit);

        let hits = self.service.chain().retrieve(query, limit).await?;
        let response = json!({ "results": format_hits(&hits) });

        Ok(CallToolResult::text(serde_json::to_string_pretty(&response)?))
    }
}

fn required_query(args: &HashMap<String, Value>) -> Result<&str> {
    let query = args
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Missing required parameter: query"))?
        .trim();

    if query.is_empty() {
        return Err(anyhow!("Parameter query must not be empty"));
    }
    Ok(query)
}

fn optional_count(args: &HashMap<String, Value>, name: &str) -> Result<Option<usize>> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };

    let count = value
        .as_u64()
        .ok_or_else(|| anyhow!("Parameter {} must be a positive integer", name))?;
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    if !(1..=MAX_RESULTS).contains(&count) {
        return Err(anyhow!(
            "Parameter {} must be between 1 and {}",
            name,
            MAX_RESULTS
        ));
    }
    Ok(Some(count))
}

/// Answer text followed by one source line per retrieved chunk
#[inline]
pub fn format_answer(outcome: &AskOutcome) -> String {
    let sources: Vec<String> = if outcome.answer.chunks.is_empty() {
        vec!["(none)".to_string()]
    } else {
        outcome
            .answer
            .chunks
            .iter()
            .map(|hit| format!("- {}: {}", hit.chunk.name, hit.chunk.source))
            .collect()
    };

    let mut sections = vec![
        outcome.answer.answer.trim_end().to_string(),
        format!("Sources:\n{}", sources.join("\n")),
    ];
    if let Err(e) = &outcome.log {
        sections.push(format!("Warning: interaction was not logged: {}", e));
    }

    sections.join("\n\n")
}

#[inline]
pub fn format_hits(hits: &[RetrievedChunk]) -> Vec<Value> {
    hits.iter()
        .map(|hit| {
            json!({
                "name": hit.chunk.name,
                "tool_id": hit.chunk.tool_id,
                "source": hit.chunk.source,
                "distance": hit.distance,
                "text": hit.chunk.text,
            })
        })
        .collect()
}
