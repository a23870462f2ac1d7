// Query-time service
// Owns the long-lived chain and logger shared by the CLI and the MCP server


use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::VectorIndex;
use crate::embeddings::{Embedder, OllamaClient};
use crate::eval::EvalLogger;
use crate::rag::{RagAnswer, RagChain};
use crate::{Result, ToolsyError};

/// An answer plus the outcome of logging it
#[derive(Debug)]
pub struct AskOutcome {
    pub answer: RagAnswer,
    pub k: usize,
    /// Path of the interaction log, or why it could not be written
    pub log: Result<PathBuf>,
}

pub struct RagService {
    chain: RagChain,
    logger: EvalLogger,
    default_k: usize,
}

impl RagService {
    /// Build the service from configuration, opening the existing index
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let client = Arc::new(
            OllamaClient::new(&config.ollama)
                .map_err(|e| ToolsyError::Config(format!("{:#}", e)))?,
        );
        let index = VectorIndex::open(&config.vector_database_path(), Arc::clone(&client) as Arc<dyn Embedder>).await?;
        let logger = EvalLogger::new(config.query_log_dir());

        info!(
            "RAG service ready (index dimension {}, default top-k {})",
            index.dimension(),
            config.retrieval.top_k
        );

        Ok(Self::new(RagChain::new(index, client), logger).with_default_k(config.retrieval.top_k))
    }

    #[inline]
    pub fn new(chain: RagChain, logger: EvalLogger) -> Self {
        Self {
            chain,
            logger,
            default_k: crate::config::RetrievalConfig::default().top_k,
        }
    }

    #[inline]
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    #[inline]
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    #[inline]
    pub fn chain(&self) -> &RagChain {
        &self.chain
    }

    #[inline]
    pub fn logger(&self) -> &EvalLogger {
        &self.logger
    }

    /// Answer a question, then record the interaction
    #[inline]
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<AskOutcome> {
        let k = k.unwrap_or(self.default_k);
        let answer = self.chain.answer(query, k).await?;

        let log = self.logger.log(query, &answer.answer, &answer.sources, k);
        if let Err(e) = &log {
            warn!("Failed to log interaction: {}", e);
        }

        Ok(AskOutcome { answer, k, log })
    }
}
