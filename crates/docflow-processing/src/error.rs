//! Error types for the clean and chunk stages

use thiserror::Error;

use docflow_common::{Cancelled, Classify, ErrorKind};
use docflow_embeddings::EmbeddingError;

/// Result type alias for processing operations
pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Errors surfaced by text processing
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Tokenizer construction or encoding failure
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Provider failure while embedding sentences for semantic boundaries
    #[error("Semantic chunking embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Invalid chunking parameters or internal inconsistency
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// Cancellation observed during processing
    #[error("Processing cancelled")]
    Cancelled,
}

impl Classify for ProcessingError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Tokenizer(_) | Self::Chunking(_) => ErrorKind::Internal,
            Self::Embedding(inner) => inner.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<Cancelled> for ProcessingError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
