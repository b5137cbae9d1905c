//! Error types for the embedding stage

use thiserror::Error;

use docflow_common::{Cancelled, Classify, ErrorKind};

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Errors surfaced by embedding providers and the embed stage
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider signalled throttling (HTTP 429)
    #[error("Embedding provider rate limited: {0}")]
    RateLimited(String),

    /// Provider returned a non-success status
    #[error("Embedding provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Transport-level failure (timeout, connection refused)
    #[error("Embedding provider network error: {0}")]
    Network(String),

    /// Response did not match the expected shape
    #[error("Embedding response malformed: {0}")]
    Malformed(String),

    /// Cancellation observed during embedding
    #[error("Embedding operation cancelled")]
    Cancelled,
}

impl Classify for EmbeddingError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Provider { status, .. } => match status {
                500..=599 => ErrorKind::Transient,
                401 | 403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                400..=499 => ErrorKind::Validation,
                _ => ErrorKind::Internal,
            },
            Self::Network(_) => ErrorKind::Transient,
            Self::Malformed(_) => ErrorKind::Internal,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<Cancelled> for EmbeddingError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_classify_per_taxonomy() {
        assert_eq!(
            EmbeddingError::RateLimited("slow down".into()).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            EmbeddingError::Provider {
                status: 503,
                message: String::new()
            }
            .kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            EmbeddingError::Provider {
                status: 401,
                message: String::new()
            }
            .kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            EmbeddingError::Provider {
                status: 400,
                message: String::new()
            }
            .kind(),
            ErrorKind::Validation
        );
    }
}
