//! CHUNK stage: token-accurate segmentation
//!
//! Three strategies share one invariant set: every chunk holds more than
//! zero and at most `chunk_size` tokens, positions are dense and
//! zero-based per document, and metadata flows down from the parent
//! document untouched.

pub mod semantic;
pub mod sentences;
pub mod token;
pub mod token_counter;

pub use semantic::cosine_similarity;
pub use sentences::split_sentences;
pub use token::ChunkPiece;
pub use token_counter::{TiktokenCounter, TokenCounter};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use docflow_config::{ChunkStrategy, ChunkingConfig};
use docflow_embeddings::EmbeddingProvider;

use crate::document::{Chunk, CleanedDocument};
use crate::error::ProcessingResult;

/// The CHUNK stage: strategy dispatch plus chunk identity assignment
pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    config: ChunkingConfig,
}

impl Chunker {
    /// Assemble from an existing counter and optional embedding provider
    ///
    /// Without a provider, the semantic and hybrid strategies fall back to
    /// the token strategy.
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        config: ChunkingConfig,
    ) -> Self {
        Self {
            counter,
            provider,
            config,
        }
    }

    /// Build the tokenizer from configuration
    ///
    /// # Errors
    ///
    /// Returns a tokenizer error if the encoder tables cannot be loaded.
    pub fn from_config(
        config: ChunkingConfig,
        provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> ProcessingResult<Self> {
        let counter = TiktokenCounter::new(&config.tokenizer_model)?;
        Ok(Self::new(Arc::new(counter), provider, config))
    }

    /// The active chunking configuration
    pub const fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk one cleaned document
    ///
    /// # Errors
    ///
    /// Returns tokenizer errors, provider errors from semantic boundary
    /// detection, and `Cancelled` when the token fires mid-detection.
    pub async fn chunk_document(
        &self,
        doc: &CleanedDocument,
        cancel: &CancellationToken,
    ) -> ProcessingResult<Vec<Chunk>> {
        let pieces = match self.config.strategy {
            ChunkStrategy::Token => {
                token::token_pieces(self.counter.as_ref(), &self.config, &doc.content, true)?
            }
            ChunkStrategy::Semantic | ChunkStrategy::Hybrid => {
                self.semantic_pieces(&doc.content, cancel).await?
            }
        };

        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(position, piece)| Chunk {
                chunk_id: Chunk::id_for(&doc.document_id, position),
                document_id: doc.document_id.clone(),
                content: piece.content,
                token_count: piece.token_count,
                position,
                metadata: doc.metadata.clone(),
            })
            .collect())
    }

    /// Chunk a batch of documents into one flat, document-ordered list
    ///
    /// # Errors
    ///
    /// See [`Chunker::chunk_document`].
    pub async fn chunk_documents(
        &self,
        docs: &[CleanedDocument],
        cancel: &CancellationToken,
    ) -> ProcessingResult<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for doc in docs {
            chunks.extend(self.chunk_document(doc, cancel).await?);
        }
        Ok(chunks)
    }

    /// SEMANTIC/HYBRID: boundary detection, then per-run token splitting.
    /// Runs that fit `chunk_size` stay whole; oversized runs are post-split
    /// by the token strategy (overlap applies inside a run, never across a
    /// semantic boundary).
    async fn semantic_pieces(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> ProcessingResult<Vec<ChunkPiece>> {
        let total = self.counter.count(text);
        if total == 0 || total < self.config.min_chunk_tokens {
            return Ok(Vec::new());
        }

        let Some(provider) = &self.provider else {
            return token::token_pieces(self.counter.as_ref(), &self.config, text, true);
        };

        let runs =
            semantic::semantic_runs(provider, self.config.similarity_threshold, text, cancel)
                .await?;

        let mut pieces = Vec::new();
        for run in &runs {
            pieces.extend(token::token_pieces(
                self.counter.as_ref(),
                &self.config,
                run,
                false,
            )?);
        }
        Ok(pieces)
    }
}
