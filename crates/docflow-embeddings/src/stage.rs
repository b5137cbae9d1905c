//! Batched embedding of chunks with bounded concurrency
//!
//! Chunks are grouped into provider batches; at most `max_workers` batches
//! are in flight at once, each retried independently through the shared
//! retry policy and spaced by the provider rate limiter. Vectors commit to
//! chunks by batch index, never by completion order, so the output always
//! matches the input ordering. A terminal failure in any batch fails the
//! whole run - partial embedding is not permitted.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use docflow_common::{RateLimiter, RetryPolicy};
use docflow_config::EmbeddingConfig;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::provider::EmbeddingProvider;

/// One chunk heading into the embed stage
#[derive(Debug, Clone)]
pub struct EmbedInput {
    pub chunk_id: String,
    pub content: String,
    pub token_count: usize,
}

/// A vector bound to its chunk, with the provider model and cost estimate
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
    pub estimated_cost: f64,
}

/// Result of embedding one document batch set
#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    /// One embedding per input chunk, in input order
    pub embeddings: Vec<ChunkEmbedding>,
    /// Sum of per-chunk cost estimates (tokens x unit price)
    pub total_cost: f64,
}

/// The EMBED stage
pub struct EmbedStage {
    provider: Arc<dyn EmbeddingProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    batch_size: usize,
    max_workers: usize,
    unit_cost_per_1k_tokens: f64,
    provider_tag: String,
}

impl EmbedStage {
    /// Assemble the stage from its collaborators
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        config: &EmbeddingConfig,
        max_workers: usize,
    ) -> Self {
        Self {
            provider,
            limiter,
            retry,
            batch_size: config.batch_size.max(1),
            max_workers: max_workers.max(1),
            unit_cost_per_1k_tokens: config.unit_cost_per_1k_tokens,
            provider_tag: config.model.clone(),
        }
    }

    /// Embed every chunk, preserving input order
    ///
    /// # Errors
    ///
    /// Fails on the first terminal batch error (retries exhausted or a
    /// non-retryable provider response) and on cancellation; no partial
    /// result is returned.
    pub async fn run(
        &self,
        inputs: &[EmbedInput],
        cancel: &CancellationToken,
    ) -> EmbeddingResult<EmbedOutcome> {
        if inputs.is_empty() {
            return Ok(EmbedOutcome {
                embeddings: Vec::new(),
                total_cost: 0.0,
            });
        }
        if cancel.is_cancelled() {
            return Err(EmbeddingError::Cancelled);
        }

        let batches: Vec<(usize, Vec<EmbedInput>)> = inputs
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, batch)| (index, batch.to_vec()))
            .collect();
        let batch_count = batches.len();

        tracing::debug!(
            chunks = inputs.len(),
            batches = batch_count,
            batch_size = self.batch_size,
            max_workers = self.max_workers,
            "embedding chunks"
        );

        let completed: Vec<(usize, Vec<Vec<f32>>)> = stream::iter(batches)
            .map(|(index, batch)| self.embed_indexed_batch(index, batch, cancel))
            .buffer_unordered(self.max_workers)
            .try_collect()
            .await?;

        // Commit vectors by batch index, not completion order
        let mut ordered: Vec<Option<Vec<Vec<f32>>>> = vec![None; batch_count];
        for (index, vectors) in completed {
            if let Some(slot) = ordered.get_mut(index) {
                *slot = Some(vectors);
            }
        }

        let model_id = self.provider.model_id().to_string();
        let mut embeddings = Vec::with_capacity(inputs.len());
        let mut total_cost = 0.0f64;
        let flattened = ordered.into_iter().flatten().flatten();
        for (input, vector) in inputs.iter().zip(flattened) {
            let estimated_cost =
                input.token_count as f64 * self.unit_cost_per_1k_tokens / 1_000.0;
            total_cost += estimated_cost;
            embeddings.push(ChunkEmbedding {
                chunk_id: input.chunk_id.clone(),
                vector,
                model_id: model_id.clone(),
                estimated_cost,
            });
        }

        if embeddings.len() != inputs.len() {
            return Err(EmbeddingError::Malformed(format!(
                "embedded {} of {} chunks",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(EmbedOutcome {
            embeddings,
            total_cost,
        })
    }

    async fn embed_batch_with_retry(
        &self,
        batch: &[EmbedInput],
        cancel: &CancellationToken,
    ) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.retry
            .run(cancel, || async move {
                self.limiter
                    .acquire_cancellable(&self.provider_tag, cancel)
                    .await?;
                let texts: Vec<&str> = batch.iter().map(|input| input.content.as_str()).collect();
                let vectors = self.provider.embed_batch(&texts).await?;
                if vectors.len() == batch.len() {
                    Ok(vectors)
                } else {
                    Err(EmbeddingError::Malformed(format!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        batch.len()
                    )))
                }
            })
            .await
    }

    async fn embed_indexed_batch(
        &self,
        index: usize,
        batch: Vec<EmbedInput>,
        cancel: &CancellationToken,
    ) -> EmbeddingResult<(usize, Vec<Vec<f32>>)> {
        self.embed_batch_with_retry(&batch, cancel)
            .await
            .map(|vectors| (index, vectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEmbeddingProvider;
    use async_trait::async_trait;
    use std::time::Duration;

    fn inputs(count: usize) -> Vec<EmbedInput> {
        (0..count)
            .map(|i| EmbedInput {
                chunk_id: format!("doc-1:{i}"),
                content: format!("chunk number {i}"),
                token_count: 10,
            })
            .collect()
    }

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            model: "mock-embedding-model".to_string(),
            dimensions: 4,
            batch_size: 100,
            base_url: "http://localhost".to_string(),
            api_key: None,
            unit_cost_per_1k_tokens: 0.02,
            request_timeout: Duration::from_secs(5),
            rate_limit: Duration::ZERO,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(100),
            jitter: 0.0,
        }
    }

    fn stage_with(provider: Arc<dyn EmbeddingProvider>, max_workers: usize) -> EmbedStage {
        EmbedStage::new(
            provider,
            Arc::new(RateLimiter::new(Duration::ZERO)),
            fast_retry(),
            &config(),
            max_workers,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn batch_retry_recovers_from_429s() {
        // 250 chunks -> 3 batches; first two calls are throttled, so the
        // first batch takes 3 attempts, and the run still embeds all 250.
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        provider.fail_next_with_429(2);
        let stage = stage_with(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>, 1);
        let cancel = CancellationToken::new();

        let outcome = stage.run(&inputs(250), &cancel).await.unwrap();

        assert_eq!(outcome.embeddings.len(), 250);
        // 2 failed attempts + 1 success for batch 0, then batches 1 and 2
        assert_eq!(provider.call_count(), 5);
        // 250 chunks x 10 tokens x $0.02/1K
        assert!((outcome.total_cost - 0.05).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn output_order_matches_input_despite_unordered_completion() {
        // Later batches complete first: delay shrinks as the batch index
        // grows. Commit-by-index must still produce input order.
        struct SlowFirstProvider {
            inner: MockEmbeddingProvider,
        }

        #[async_trait]
        impl EmbeddingProvider for SlowFirstProvider {
            async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
                let first = texts.first().copied().unwrap_or_default();
                let delay = if first.contains("number 0") { 50 } else { 5 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                self.inner.embed_batch(texts).await
            }

            fn dimensions(&self) -> usize {
                self.inner.dimensions()
            }

            fn model_id(&self) -> &str {
                self.inner.model_id()
            }
        }

        let provider = Arc::new(SlowFirstProvider {
            inner: MockEmbeddingProvider::new(4),
        });
        let stage = stage_with(provider, 4);
        let cancel = CancellationToken::new();
        let chunk_inputs = inputs(250);

        let outcome = stage.run(&chunk_inputs, &cancel).await.unwrap();

        let ids: Vec<&str> = outcome
            .embeddings
            .iter()
            .map(|e| e.chunk_id.as_str())
            .collect();
        let expected: Vec<&str> = chunk_inputs.iter().map(|i| i.chunk_id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn empty_input_is_a_noop() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let stage = stage_with(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>, 4);
        let cancel = CancellationToken::new();

        let outcome = stage.run(&[], &cancel).await.unwrap();
        assert!(outcome.embeddings.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_the_whole_run() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        provider.fail_next_with_429(10); // More than max_attempts
        let stage = stage_with(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>, 2);
        let cancel = CancellationToken::new();

        let result = stage.run(&inputs(10), &cancel).await;
        assert!(matches!(result, Err(EmbeddingError::RateLimited(_))));
    }

    #[tokio::test]
    async fn cancellation_aborts_before_work() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let stage = stage_with(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>, 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = stage.run(&inputs(10), &cancel).await;
        assert!(matches!(result, Err(EmbeddingError::Cancelled)));
        assert_eq!(provider.call_count(), 0);
    }
}
