//! SEMANTIC boundary detection
//!
//! Sentences are embedded in small batches through the shared embedding
//! provider; a topic boundary is placed between adjacent sentences whose
//! cosine similarity falls below the configured threshold. Each resulting
//! run of sentences keeps its exact text, so downstream token splitting
//! preserves the document byte-for-byte.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use docflow_embeddings::EmbeddingProvider;

use crate::chunking::sentences::split_sentences;
use crate::error::{ProcessingError, ProcessingResult};

/// Sentences per provider call while embedding for boundary detection
const SENTENCE_EMBED_BATCH: usize = 32;

/// Cosine similarity of two vectors; zero-magnitude vectors compare as 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Split text into runs of topically-coherent sentences
///
/// Runs concatenate back to the input exactly. A text with at most one
/// sentence is returned whole.
///
/// # Errors
///
/// Returns embedding errors from the provider and `Cancelled` when the
/// token fires between batches.
pub async fn semantic_runs(
    provider: &Arc<dyn EmbeddingProvider>,
    similarity_threshold: f64,
    text: &str,
    cancel: &CancellationToken,
) -> ProcessingResult<Vec<String>> {
    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return Ok(if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        });
    }

    // Embed each sentence (trimmed; the trailing whitespace carries no
    // meaning for similarity)
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(sentences.len());
    for batch in sentences.chunks(SENTENCE_EMBED_BATCH) {
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }
        let texts: Vec<&str> = batch.iter().map(|s| s.trim()).collect();
        vectors.extend(provider.embed_batch(&texts).await?);
    }
    if vectors.len() != sentences.len() {
        return Err(ProcessingError::Chunking(format!(
            "expected {} sentence vectors, got {}",
            sentences.len(),
            vectors.len()
        )));
    }

    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();
    for (i, sentence) in sentences.iter().enumerate() {
        if i > 0 {
            let similarity = cosine_similarity(
                vectors.get(i - 1).map_or(&[][..], Vec::as_slice),
                vectors.get(i).map_or(&[][..], Vec::as_slice),
            );
            if similarity < similarity_threshold && !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push_str(sentence);
    }
    if !current.is_empty() {
        runs.push(current);
    }

    tracing::debug!(
        sentences = sentences.len(),
        runs = runs.len(),
        threshold = similarity_threshold,
        "semantic boundary detection complete"
    );
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docflow_embeddings::{EmbeddingError, EmbeddingResult};

    /// Embeds sentences onto one of two orthogonal axes by topic keyword
    struct TopicProvider;

    #[async_trait]
    impl EmbeddingProvider for TopicProvider {
        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    if text.contains("cat") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "topic-mock"
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 1.0], &[1.0, 1.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn boundary_placed_at_topic_shift() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(TopicProvider);
        let cancel = CancellationToken::new();
        let text = "The cat sat on the mat. The cat chased a mouse. Quarterly revenue grew by ten percent. Margins also improved.";

        let runs = semantic_runs(&provider, 0.5, text, &cancel).await.unwrap();

        assert_eq!(runs.len(), 2);
        assert!(runs[0].contains("cat sat"));
        assert!(runs[0].contains("chased"));
        assert!(runs[1].contains("revenue"));
        // Runs reconstruct the document exactly
        assert_eq!(runs.concat(), text);
    }

    #[tokio::test]
    async fn single_sentence_is_one_run() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(TopicProvider);
        let cancel = CancellationToken::new();
        let runs = semantic_runs(&provider, 0.5, "Only one sentence here.", &cancel)
            .await
            .unwrap();
        assert_eq!(runs, vec!["Only one sentence here.".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_stops_embedding() {
        struct NeverProvider;

        #[async_trait]
        impl EmbeddingProvider for NeverProvider {
            async fn embed_batch(&self, _texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
                Err(EmbeddingError::Network("should not be called".to_string()))
            }

            fn dimensions(&self) -> usize {
                2
            }

            fn model_id(&self) -> &str {
                "never"
            }
        }

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(NeverProvider);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = semantic_runs(&provider, 0.5, "One. Two. Three.", &cancel).await;
        assert!(matches!(result, Err(ProcessingError::Cancelled)));
    }
}
