//! Embedding provider abstraction and the remote HTTP implementation

use async_trait::async_trait;
use serde::Deserialize;

use docflow_config::EmbeddingConfig;

use crate::error::{EmbeddingError, EmbeddingResult};

/// Generates embedding vectors for batches of text
///
/// The provider returns exactly one vector per input, in input order. The
/// embed stage and the semantic chunker both consume this trait.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts
    ///
    /// # Errors
    ///
    /// Returns provider, network, or shape errors; retrying is the
    /// caller's concern.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Dimension of the vectors this provider produces
    fn dimensions(&self) -> usize;

    /// Model identifier recorded on every embedding
    fn model_id(&self) -> &str;

    /// Whether the provider can currently serve requests
    async fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Remote embedding provider speaking the `/embeddings` JSON protocol
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    /// Build a provider from configuration
    ///
    /// # Errors
    ///
    /// Returns a network error if the HTTP client cannot be constructed.
    pub fn new(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EmbeddingError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Network(format!("request timed out: {e}"))
            } else {
                EmbeddingError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RateLimited(message));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} vectors, provider returned {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // Vectors commit to inputs by the provider-reported index
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for datum in parsed.data {
            let slot = vectors.get_mut(datum.index).ok_or_else(|| {
                EmbeddingError::Malformed(format!("vector index {} out of range", datum.index))
            })?;
            *slot = Some(datum.embedding);
        }
        vectors
            .into_iter()
            .enumerate()
            .map(|(i, vector)| {
                vector.ok_or_else(|| EmbeddingError::Malformed(format!("missing vector for input {i}")))
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn is_ready(&self) -> bool {
        true
    }
}
