//! Error types for source adapters
//!
//! Variants mirror the pipeline error taxonomy one-to-one so the fetch
//! stage classifies without inspecting messages.

use thiserror::Error;

use docflow_common::{Cancelled, Classify, ErrorKind};

/// Result type alias for adapter operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors surfaced by source adapters
#[derive(Error, Debug)]
pub enum SourceError {
    /// Inputs rejected before any I/O
    #[error("Invalid parameters: {0}")]
    Validation(String),

    /// External resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Policy denial (robots.txt, read-only mode, HTTP 401/403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// HTTP 429 or provider throttling
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network timeout, HTTP 5xx, temporary backend error
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// Response or file exceeds a configured cap
    #[error("Size cap exceeded: {0}")]
    SizeExceeded(String),

    /// Cancellation observed during a fetch
    #[error("Fetch cancelled")]
    Cancelled,

    /// Anything unclassified
    #[error("Fetch error: {0}")]
    Internal(String),
}

impl SourceError {
    /// Classify an HTTP status into the taxonomy
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 | 403 => Self::Forbidden(format!("{context}: HTTP {status}")),
            404 | 410 => Self::NotFound(format!("{context}: HTTP {status}")),
            429 => Self::RateLimited(format!("{context}: HTTP {status}")),
            500..=599 => Self::Transient(format!("{context}: HTTP {status}")),
            _ => Self::Internal(format!("{context}: HTTP {status}")),
        }
    }

    /// Classify a reqwest transport error
    pub fn from_transport(error: &reqwest::Error, context: &str) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::Transient(format!("{context}: {error}"))
        } else {
            Self::Internal(format!("{context}: {error}"))
        }
    }
}

impl Classify for SourceError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Transient(_) => ErrorKind::Transient,
            Self::SizeExceeded(_) => ErrorKind::SizeExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<Cancelled> for SourceError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
