//! Client for a standalone HTTP embedding server.
//!
//! Speaks the server's JSON protocol:
//!
//! ```text
//! POST {url}/embed   {"texts": ["..."], "use_cache": true}
//!                 -> {"embeddings": [[...]], "dimension": 384, "count": 1, ...}
//! GET  {url}/health -> {"status": "healthy", "model": "...", ...}
//! ```
//!
//! The server rejects batches above [`MAX_TEXTS_PER_REQUEST`], so larger
//! inputs are split client-side.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::{ModelError, ModelResult};
use crate::EmbeddingProvider;

/// Largest batch the embedding server accepts.
pub const MAX_TEXTS_PER_REQUEST: usize = 1000;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [&'a str],
    use_cache: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    dimension: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    model: Option<String>,
}

/// Embedding provider backed by a remote embedding server.
#[derive(Debug)]
pub struct HttpEmbeddingModel {
    client: Client,
    base_url: String,
    name: String,
    dimension: usize,
    batch_size: usize,
}

impl HttpEmbeddingModel {
    /// Connect to the server at `config.url` and verify it reports healthy.
    pub fn new(config: &EmbeddingConfig) -> ModelResult<Self> {
        let base_url = config.url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ModelError::remote(&base_url, e.to_string()))?;

        let health_url = format!("{}/health", base_url);
        let health: HealthResponse = client
            .get(&health_url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| ModelError::remote(&health_url, e.to_string()))?;

        if health.status != "healthy" {
            return Err(ModelError::not_available(
                "http",
                format!("server at {} reports status '{}'", base_url, health.status),
            ));
        }

        let name = health.model.unwrap_or_else(|| config.model_id.clone());
        info!("Connected to embedding server {} (model={})", base_url, name);

        Ok(Self {
            client,
            base_url,
            name,
            dimension: config.dimension,
            batch_size: config.batch_size.clamp(1, MAX_TEXTS_PER_REQUEST),
        })
    }

    fn embed_chunk(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        debug!("POST {} ({} texts)", url, texts.len());

        let response: EmbedResponse = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                texts,
                use_cache: true,
            })
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| ModelError::remote(&url, e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(ModelError::embedding_failed(
                &self.name,
                format!(
                    "server returned {} embeddings for {} texts",
                    response.embeddings.len(),
                    texts.len()
                ),
            ));
        }

        let actual = response
            .dimension
            .or_else(|| response.embeddings.first().map(Vec::len))
            .unwrap_or(self.dimension);
        if actual != self.dimension {
            return Err(ModelError::DimensionMismatch {
                provider: self.name.clone(),
                expected: self.dimension,
                actual,
            });
        }

        Ok(response.embeddings)
    }
}

impl EmbeddingProvider for HttpEmbeddingModel {
    fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.embed_chunk(chunk)?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}
