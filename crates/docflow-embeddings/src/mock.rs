//! Deterministic embedding provider for tests
//!
//! Produces stable vectors without network access, and can be programmed
//! to fail a number of times first to exercise retry paths.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::provider::EmbeddingProvider;

/// Test double producing deterministic low-dimension vectors
pub struct MockEmbeddingProvider {
    dimensions: usize,
    model: String,
    calls: AtomicUsize,
    failures_remaining: AtomicU32,
}

impl MockEmbeddingProvider {
    /// Provider emitting `dimensions`-wide vectors
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: "mock-embedding-model".to_string(),
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicU32::new(0),
        }
    }

    /// Fail the next `count` calls with HTTP-429-style errors before
    /// succeeding
    pub fn fail_next_with_429(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Total `embed_batch` invocations, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Deterministic vector for a text: unit-ish direction derived from
    /// its bytes, so identical texts embed identically
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let seed = text
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        (0..self.dimensions)
            .map(|i| {
                let scrambled = seed.wrapping_add((i as u32).wrapping_mul(2_654_435_761)) % 1_000;
                (scrambled as f32 / 500.0) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(EmbeddingError::RateLimited(
                "mock provider throttling".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vectors_are_deterministic() {
        let provider = MockEmbeddingProvider::new(4);
        let first = provider.embed_batch(&["hello"]).await.unwrap();
        let second = provider.embed_batch(&["hello"]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 4);
    }

    #[tokio::test]
    async fn programmed_failures_then_success() {
        let provider = MockEmbeddingProvider::new(4);
        provider.fail_next_with_429(2);

        assert!(provider.embed_batch(&["x"]).await.is_err());
        assert!(provider.embed_batch(&["x"]).await.is_err());
        assert!(provider.embed_batch(&["x"]).await.is_ok());
        assert_eq!(provider.call_count(), 3);
    }
}
