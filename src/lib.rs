use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolsyError>;

#[derive(Error, Debug)]
pub enum ToolsyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Listing entry has no identifier: {0}")]
    MissingIdentifier(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod catalog;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod eval;
pub mod harvester;
pub mod mcp;
pub mod rag;
pub mod service;
