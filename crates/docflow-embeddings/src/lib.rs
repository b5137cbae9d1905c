//! Embedding generation for the ingestion pipeline
//!
//! The [`EmbeddingProvider`] trait is the single seam to the external
//! provider; [`EmbedStage`] layers batching, bounded concurrency, per-batch
//! retry, and cost accounting on top of it. The semantic chunker reuses the
//! same provider trait for sentence embeddings.

pub mod error;
pub mod mock;
pub mod provider;
pub mod stage;

pub use error::{EmbeddingError, EmbeddingResult};
pub use mock::MockEmbeddingProvider;
pub use provider::{EmbeddingProvider, HttpEmbeddingProvider};
pub use stage::{ChunkEmbedding, EmbedInput, EmbedOutcome, EmbedStage};
