//! MCP Protocol Implementation Tests
//!
//! Protocol compliance, message routing and tool behaviour, driven through
//! in-memory readers and writers.

use super::protocol::*;
use super::server::{ConnectionState, McpServer, ToolHandler};
use super::tools::{AskToolsHandler, SearchToolsHandler, format_answer};
use super::build_server;
use crate::database::{RetrievedChunk, VectorIndex};
use crate::embeddings::{Chunk, Embedder, LanguageModel};
use crate::eval::EvalLogger;
use crate::rag::{RagAnswer, RagChain};
use crate::service::{AskOutcome, RagService};
use crate::ToolsyError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::BufReader;

struct LetterEmbedder;

impl Embedder for LetterEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(['a', 'b']
            .iter()
            .map(|letter| text.chars().filter(|c| c == letter).count() as f32)
            .collect())
    }
}

struct CannedModel;

impl LanguageModel for CannedModel {
    fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok("Bowtie aligns short reads.".to_string())
    }
}

struct FailingModel;

impl LanguageModel for FailingModel {
    fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("ollama is down"))
    }
}

struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn handle(&self, params: CallToolParams) -> anyhow::Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        match args.get("text").and_then(Value::as_str) {
            Some(text) => Ok(CallToolResult::text(text.to_string())),
            None => Err(anyhow::anyhow!("Missing required parameter: text")),
        }
    }
}

fn chunk(name: &str, text: &str) -> Chunk {
    Chunk {
        tool_id: name.to_lowercase(),
        name: name.to_string(),
        source: format!("https://bio.tools/api/t/{}?format=json", name.to_lowercase()),
        chunk_index: 0,
        text: text.to_string(),
    }
}

async fn service(temp_dir: &TempDir, model: Arc<dyn LanguageModel>) -> Arc<RagService> {
    let index = VectorIndex::build(
        &temp_dir.path().join("vectors"),
        &[chunk("Bowtie", "aaaa"), chunk("BWA", "aaab"), chunk("Samtools", "bbbb")],
        Arc::new(LetterEmbedder),
    )
    .await
    .expect("build should succeed");
    Arc::new(RagService::new(
        RagChain::new(index, model),
        EvalLogger::new(temp_dir.path().join("logs")),
    ))
}

async fn echo_server() -> McpServer {
    let server = McpServer::new("test".to_string(), "0.0.0".to_string());
    server
        .register_tool(
            Tool {
                name: "echo".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
            },
            EchoHandler,
        )
        .await;
    server
}

async fn reply(server: &McpServer, message: Value) -> Value {
    let reply = server
        .handle_line(&message.to_string())
        .await
        .expect("request should get a reply");
    serde_json::to_value(reply).expect("reply serializes")
}

fn call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments},
    })
}

fn result_text(reply: &Value) -> &str {
    reply["result"]["content"][0]["text"]
        .as_str()
        .expect("text content")
}

#[test]
fn ask_tools_definition() {
    let tool = AskToolsHandler::tool_definition();

    assert_eq!(tool.name, "ask_tools");
    let schema = tool.input_schema;
    let properties = schema["properties"].as_object().expect("has properties");
    assert!(properties.contains_key("query"));
    assert!(properties.contains_key("top_k"));
    assert_eq!(schema["properties"]["top_k"]["minimum"], 1);

    let required = schema["required"].as_array().expect("has required array");
    assert_eq!(required.len(), 1);
    assert_eq!(required[0], "query");
}

#[test]
fn search_tools_definition() {
    let tool = SearchToolsHandler::tool_definition();

    assert_eq!(tool.name, "search_tools");
    let schema = tool.input_schema;
    assert_eq!(schema["properties"]["query"]["type"], "string");
    assert_eq!(schema["properties"]["limit"]["type"], "integer");
}

#[test]
fn answer_formatting_lists_sources_and_log_failures() {
    let hit = RetrievedChunk {
        chunk: chunk("Bowtie", "aaaa"),
        distance: 0.0,
        position: 0,
    };
    let outcome = AskOutcome {
        answer: RagAnswer {
            answer: "Use Bowtie.\n".to_string(),
            sources: vec!["Bowtie".to_string()],
            chunks: vec![hit],
        },
        k: 3,
        log: Err(ToolsyError::Storage("disk full".to_string())),
    };

    let text = format_answer(&outcome);

    assert!(text.starts_with("Use Bowtie.\n\nSources:\n- Bowtie: https://bio.tools/api/t/bowtie?format=json"));
    assert!(text.ends_with("Warning: interaction was not logged: Storage error: disk full"));
}

#[test]
fn answer_formatting_exact_layout() {
    let hits = ["Bowtie", "BWA"]
        .into_iter()
        .enumerate()
        .map(|(position, name)| RetrievedChunk {
            chunk: chunk(name, "aaaa"),
            distance: 0.0,
            position: position as u32,
        })
        .collect();
    let logged = AskOutcome {
        answer: RagAnswer {
            answer: "Use Bowtie.".to_string(),
            sources: vec!["Bowtie".to_string(), "BWA".to_string()],
            chunks: hits,
        },
        k: 2,
        log: Ok("query.json".into()),
    };
    let empty = AskOutcome {
        answer: RagAnswer {
            answer: "I don't know.".to_string(),
            sources: Vec::new(),
            chunks: Vec::new(),
        },
        k: 2,
        log: Ok("query.json".into()),
    };

    let bowtie = &logged.answer.chunks[0].chunk.source;
    let bwa = &logged.answer.chunks[1].chunk.source;
    assert_eq!(
        format_answer(&logged),
        format!("Use Bowtie.\n\nSources:\n- Bowtie: {bowtie}\n- BWA: {bwa}")
    );
    assert_eq!(format_answer(&empty), "I don't know.\n\nSources:\n(none)");
}

#[tokio::test]
async fn initialize_handshake() {
    let server = echo_server().await;
    assert_eq!(server.connection_state().await, ConnectionState::Uninitialized);

    let response = reply(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"},
            },
        }),
    )
    .await;

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "test");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert_eq!(server.connection_state().await, ConnectionState::Initializing);

    let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert!(server.handle_line(&notification.to_string()).await.is_none());
    assert_eq!(server.connection_state().await, ConnectionState::Ready);
}

#[tokio::test]
async fn unknown_protocol_version_gets_ours() {
    let server = echo_server().await;
    let response = reply(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": "init",
            "method": "initialize",
            "params": {"protocolVersion": "1999-01-01"},
        }),
    )
    .await;

    assert_eq!(response["id"], "init");
    assert_eq!(response["result"]["protocolVersion"], MCP_VERSION);
}

#[tokio::test]
async fn protocol_errors() {
    let server = echo_server().await;

    let parse = server.handle_line("{not json").await.expect("reply");
    let parse = serde_json::to_value(parse).expect("serializes");
    assert_eq!(parse["error"]["code"], error_codes::PARSE_ERROR);

    let wrong_version = reply(&server, json!({"jsonrpc": "1.0", "id": 4, "method": "ping"})).await;
    assert_eq!(wrong_version["error"]["code"], error_codes::INVALID_REQUEST);
    assert_eq!(wrong_version["id"], 4);

    let unknown = reply(&server, json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"})).await;
    assert_eq!(unknown["error"]["code"], error_codes::METHOD_NOT_FOUND);

    let missing_tool = reply(&server, call(6, "nope", json!({}))).await;
    assert_eq!(missing_tool["error"]["code"], error_codes::INVALID_PARAMS);

    let ping = reply(&server, json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})).await;
    assert_eq!(ping["result"], json!({}));

    assert!(server.handle_line("   ").await.is_none());
}

#[tokio::test]
async fn handler_errors_become_tool_results() {
    let server = echo_server().await;

    let ok = reply(&server, call(1, "echo", json!({"text": "hello"}))).await;
    assert_eq!(result_text(&ok), "hello");
    assert_eq!(ok["result"]["isError"], false);

    let failed = reply(&server, call(2, "echo", json!({}))).await;
    assert_eq!(failed["result"]["isError"], true);
    assert!(result_text(&failed).contains("Missing required parameter: text"));
}

#[tokio::test]
async fn serve_processes_lines_until_eof() {
    let server = echo_server().await;
    let input = format!(
        "{}\n\n{}\n{}\n",
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        call(2, "echo", json!({"text": "still alive"})),
    );
    let mut output = Vec::new();

    server
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .expect("serve should finish");

    let replies: Vec<Value> = String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(result_text(&replies[1]), "still alive");
    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn registered_tools_are_listed_in_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = build_server(service(&temp_dir, Arc::new(CannedModel)).await).await;

    let response = reply(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(names, vec!["ask_tools", "search_tools"]);
}

#[tokio::test]
async fn ask_tools_answers_with_sources() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = build_server(service(&temp_dir, Arc::new(CannedModel)).await).await;

    let response = reply(&server, call(1, "ask_tools", json!({"query": "aaaa", "top_k": 2}))).await;

    assert_eq!(response["result"]["isError"], false);
    let text = result_text(&response);
    assert!(text.starts_with("Bowtie aligns short reads.\n\nSources:"));
    assert!(text.contains("- Bowtie: https://bio.tools/api/t/bowtie?format=json"));
    assert!(text.contains("- BWA: https://bio.tools/api/t/bwa?format=json"));
    assert!(!text.contains("Samtools"));
    assert!(!text.contains("Warning"));
}

#[tokio::test]
async fn ask_tools_reports_failures_without_ending_session() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = build_server(service(&temp_dir, Arc::new(FailingModel)).await).await;

    let failed = reply(&server, call(1, "ask_tools", json!({"query": "aaaa"}))).await;
    assert_eq!(failed["result"]["isError"], true);
    assert!(result_text(&failed).contains("ollama is down"));

    let invalid_k = reply(&server, call(2, "ask_tools", json!({"query": "aaaa", "top_k": 0}))).await;
    assert_eq!(invalid_k["result"]["isError"], true);

    let missing = reply(&server, call(3, "ask_tools", json!({"top_k": 2}))).await;
    assert_eq!(missing["result"]["isError"], true);

    let ping = reply(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "ping"})).await;
    assert_eq!(ping["result"], json!({}));
}

#[tokio::test]
async fn search_tools_returns_raw_hits() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = build_server(service(&temp_dir, Arc::new(FailingModel)).await).await;

    let response = reply(&server, call(1, "search_tools", json!({"query": "bbbb", "limit": 1}))).await;

    assert_eq!(response["result"]["isError"], false);
    let body: Value = serde_json::from_str(result_text(&response)).expect("json body");
    let results = body["results"].as_array().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["name"], "Samtools");
    assert_eq!(results[0]["distance"], 0.0);
    assert_eq!(results[0]["text"], "bbbb");
}
