// RAG module
// Retrieval, context assembly, prompting and answer generation


use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::database::{RetrievedChunk, VectorIndex};
use crate::embeddings::LanguageModel;
use crate::{Result, ToolsyError};

const PROMPT_INSTRUCTIONS: &str = "You are an assistant for answering questions about bioinformatics software tools.
Use the following pieces of context to answer the question.
Be concise. If a homepage or documentation is mentioned, include it.
Answer strictly from the context. If the context does not contain the answer, say so.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Result of one question-answering pass
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    /// Model output, unmodified
    pub answer: String,
    /// Distinct tool names of the retrieved chunks, in retrieval order
    pub sources: Vec<String>,
    pub chunks: Vec<RetrievedChunk>,
}

pub struct RagChain {
    index: VectorIndex,
    model: Arc<dyn LanguageModel>,
}

impl RagChain {
    #[inline]
    pub fn new(index: VectorIndex, model: Arc<dyn LanguageModel>) -> Self {
        Self { index, model }
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Retrieve the `k` nearest chunks without generating
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        self.index.query(query, k).await
    }

    /// Answer `query` from the `k` nearest chunks
    #[inline]
    pub async fn answer(&self, query: &str, k: usize) -> Result<RagAnswer> {
        let chunks = self.retrieve(query, k).await?;
        let context = format_context(&chunks);
        let prompt = build_prompt(&context, query);

        debug!(
            "Generating answer from {} chunks (prompt length: {})",
            chunks.len(),
            prompt.len()
        );

        let model = Arc::clone(&self.model);
        let answer = tokio::task::spawn_blocking(move || model.generate(&prompt))
            .await
            .map_err(|e| ToolsyError::Generation(format!("Generation task failed: {}", e)))?
            .map_err(|e| ToolsyError::Generation(format!("{:#}", e)))?;

        Ok(RagAnswer {
            answer,
            sources: distinct_sources(&chunks),
            chunks,
        })
    }
}

/// Render retrieved chunks as the prompt context, in retrieval order
#[inline]
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|hit| {
            format!(
                "Source: [{}]({})\n\n{}",
                hit.chunk.name, hit.chunk.source, hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("{PROMPT_INSTRUCTIONS}\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:")
}

/// Tool names in first-occurrence order
#[inline]
pub fn distinct_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|hit| seen.insert(hit.chunk.name.as_str()))
        .map(|hit| hit.chunk.name.clone())
        .collect()
}
