//! Error types for vector storage operations

use thiserror::Error;

use docflow_common::{Cancelled, Classify, ErrorKind};

/// Result type alias for vector storage operations
pub type VectorDataResult<T> = Result<T, VectorDataError>;

/// Errors surfaced by vector storage backends
#[derive(Error, Debug)]
pub enum VectorDataError {
    /// Backend connection or upsert failure
    #[error("Vector storage error: {0}")]
    Storage(String),

    /// Client construction / configuration failure
    #[error("Vector storage configuration error: {0}")]
    Config(String),

    /// Cancellation observed during a storage call
    #[error("Vector storage operation cancelled")]
    Cancelled,
}

impl Classify for VectorDataError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) => ErrorKind::Transient,
            Self::Config(_) => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<Cancelled> for VectorDataError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
