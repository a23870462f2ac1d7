// Embeddings module
// Model seams (embedding and generation), Ollama client and text chunking

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{Chunk, ChunkingConfig, chunk_catalog, split_text};
pub use ollama::OllamaClient;

/// Maps text to a fixed-dimension vector
pub trait Embedder: Send + Sync {
    /// Embed one text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Produces a single completion for a prompt
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}
