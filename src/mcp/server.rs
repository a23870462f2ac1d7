//! MCP Server Implementation
//!
//! Line-delimited JSON-RPC over stdio with message routing and tool dispatch.

use crate::mcp::protocol::*;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Registered tools, in registration order
    tools: Arc<RwLock<Vec<Tool>>>,
    tool_handlers: Arc<RwLock<HashMap<String, Box<dyn ToolHandler>>>>,
    connection_state: Arc<RwLock<ConnectionState>>,
}

/// Connection state tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        Self {
            server_info: Implementation { name, version },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            tools: Arc::new(RwLock::new(Vec::new())),
            tool_handlers: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
        }
    }

    /// Register a tool with the server, replacing any tool of the same name
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();

        {
            let mut tools = self.tools.write().await;
            tools.retain(|existing| existing.name != tool_name);
            tools.push(tool);
        }

        {
            let mut handlers = self.tool_handlers.write().await;
            handlers.insert(tool_name.clone(), Box::new(handler));
        }

        debug!("Registered tool: {}", tool_name);
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve line-delimited messages from `reader` until EOF
    #[inline]
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(reply) = self.handle_line(&line).await {
                        send_message(&mut writer, &reply).await?;
                    }
                }
                Ok(None) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;
        info!("MCP server stopped");
        Ok(())
    }

    /// Process one raw line, returning the reply to send, if any
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON: {}", e);
                return Some(error_message(JsonRpcError::parse_error(), None));
            }
        };

        let message = match validate_message(raw_value) {
            Ok(message) => message,
            Err((e, id)) => {
                error!("Message validation failed: {}", e);
                return Some(error_message(JsonRpcError::invalid_request(), id));
            }
        };

        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection_state.read().await.clone()
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            _ => {
                debug!("Unknown method: {}", request.method);
                return error_message(JsonRpcError::method_not_found(), Some(request.id));
            }
        };

        match response {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(RequestError::InvalidParams(message)) => {
                warn!("Invalid params for {}: {}", request.method, message);
                error_message(JsonRpcError::invalid_params(Some(message)), Some(request.id))
            }
            Err(RequestError::Internal(e)) => {
                error!("Error handling request {}: {}", request.method, e);
                error_message(
                    JsonRpcError::internal_error(Some(e.to_string())),
                    Some(request.id),
                )
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                *self.connection_state.write().await = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => debug!("Received cancellation notification"),
            _ => warn!("Unknown notification method: {}", notification.method),
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, RequestError> {
        let params: InitializeParams = parse_params(params, "initialize")?;

        // Answer with the client's version when we speak it, otherwise with ours
        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str())
        {
            params.protocol_version.clone()
        } else {
            warn!(
                "Client requested protocol {}, offering {}",
                params.protocol_version, MCP_VERSION
            );
            MCP_VERSION.to_string()
        };

        *self.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version,
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: Some(
                "Answers questions about bioinformatics software tools from the bio.tools registry"
                    .to_string(),
            ),
        };

        let client = params
            .client_info
            .map_or_else(|| "unknown".to_string(), |info| info.name);
        info!("Client initialized: {}", client);
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_tools(&self) -> Result<Value, RequestError> {
        let tools = self.tools.read().await.clone();
        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, RequestError> {
        let params: CallToolParams = parse_params(params, "tools/call")?;

        let handlers = self.tool_handlers.read().await;
        let handler = handlers
            .get(&params.name)
            .ok_or_else(|| RequestError::InvalidParams(format!("Tool not found: {}", params.name)))?;

        let tool_name = params.name.clone();
        let result = match handler.handle(params).await {
            Ok(result) => result,
            Err(e) => {
                error!("Tool {} failed: {:#}", tool_name, e);
                CallToolResult::error(format!("{:#}", e))
            }
        };
        Ok(serde_json::to_value(result)?)
    }
}

enum RequestError {
    InvalidParams(String),
    Internal(anyhow::Error),
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.into())
    }
}

fn parse_params<T>(params: Option<Value>, method: &str) -> Result<T, RequestError>
where
    T: serde::de::DeserializeOwned,
{
    let params =
        params.ok_or_else(|| RequestError::InvalidParams(format!("{} request missing parameters", method)))?;
    serde_json::from_value(params).map_err(|e| RequestError::InvalidParams(e.to_string()))
}

/// Check the JSON-RPC envelope, returning the request id for error replies
fn validate_message(value: Value) -> Result<JsonRpcMessage, (anyhow::Error, Option<RequestId>)> {
    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

    if value.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err((anyhow!("jsonrpc must be \"{}\"", JSONRPC_VERSION), id));
    }

    serde_json::from_value(value).map_err(|e| (anyhow!(e), id))
}

fn error_message(error: JsonRpcError, id: Option<RequestId>) -> JsonRpcMessage {
    JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(error, id))
}

/// Send a message to the client
async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
