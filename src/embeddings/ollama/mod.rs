
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use ureq::Body;
use ureq::http::Response;
use url::Url;

use super::{Embedder, LanguageModel};
use crate::config::OllamaConfig;

/// Generation runs at temperature zero so answers are reproducible
pub const GENERATION_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Body Ollama sends with a failing status
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            batch_size: config.batch_size.max(1),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Test connection to Ollama server and verify both models are available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;
        for model in [&self.embedding_model, &self.generation_model] {
            if !models.iter().any(|m| model_matches(&m.name, model)) {
                let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    model,
                    available
                ));
            }
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .send(|| {
                self.agent
                    .get(url.as_str())
                    .call()
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate embeddings for multiple texts, `batch_size` texts per request
    #[inline]
    pub fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let embeddings = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .send(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
            })
            .context("Failed to generate embeddings")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }

    /// Generate a completion with the generation model
    #[inline]
    pub fn generate_completion(&self, prompt: &str) -> Result<String> {
        debug!("Generating completion (prompt length: {})", prompt.len());

        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: GENERATION_TEMPERATURE,
            },
        };

        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generation URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generation request")?;

        let response_text = self
            .send(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
            })
            .context("Failed to generate completion")?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")?;

        debug!("Generated completion of {} bytes", response.response.len());
        Ok(response.response)
    }

    /// Issue one request; failures are classified but never retried
    fn send<F>(&self, request_fn: F) -> Result<String>
    where
        F: FnOnce() -> Result<Response<Body>, ureq::Error>,
    {
        let mut response = match request_fn() {
            Ok(response) => response,
            Err(
                error @ (ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_)),
            ) => {
                warn!("Transport error talking to {}: {}", self.base_url, error);
                return Err(anyhow::anyhow!("Transport error: {}", error));
            }
            Err(error) => return Err(anyhow::anyhow!("Request error: {}", error)),
        };

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .context("Failed to read response body")?;
        if status.is_success() {
            return Ok(body);
        }

        let detail = error_detail(&body);
        if status.is_server_error() {
            warn!(
                "Server error (status {}) from {}{}",
                status.as_u16(),
                self.base_url,
                detail
            );
            Err(anyhow::anyhow!(
                "Server error: HTTP {}{}",
                status.as_u16(),
                detail
            ))
        } else {
            warn!(
                "Client error (status {}) from {}{}",
                status.as_u16(),
                self.base_url,
                detail
            );
            Err(anyhow::anyhow!(
                "Client error: HTTP {}{}",
                status.as_u16(),
                detail
            ))
        }
    }
}

/// `": message"` from an Ollama error body, or nothing when the body has none
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(response) => format!(": {}", response.error),
        Err(_) => String::new(),
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Ollama reports `name:tag`; a bare model name means `:latest`
fn model_matches(available: &str, wanted: &str) -> bool {
    available == wanted || available.strip_suffix(":latest") == Some(wanted)
}

impl Embedder for OllamaClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.generate_embeddings(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Ollama returned no embedding"))
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings(texts)
    }
}

impl LanguageModel for OllamaClient {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_completion(prompt)
    }
}
