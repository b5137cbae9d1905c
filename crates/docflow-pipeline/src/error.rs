//! The pipeline error funnel
//!
//! Every stage error converges here; the orchestrator performs exactly one
//! terminal transition based on the classified kind and formats the job's
//! `error_message` as "<Kind>. <diagnostic>".

use thiserror::Error;

use docflow_common::{Cancelled, Classify, ErrorKind};
use docflow_embeddings::EmbeddingError;
use docflow_job_data::JobStoreError;
use docflow_processing::ProcessingError;
use docflow_sources::SourceError;
use docflow_vector_data::VectorDataError;

use crate::stage::StageKind;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Any failure that can end a job
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Processing(#[from] ProcessingError),

    #[error("{0}")]
    Embedding(#[from] EmbeddingError),

    #[error("{0}")]
    VectorData(#[from] VectorDataError),

    #[error("{0}")]
    JobStore(#[from] JobStoreError),

    /// A stage exceeded the configured wall-clock ceiling
    #[error("{stage} stage timed out")]
    StageTimeout { stage: StageKind },

    /// Cancellation observed at a stage boundary
    #[error("job cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Job `error_message` format: first sentence is the error kind, the
    /// remainder a short human-readable diagnostic
    pub fn job_error_message(&self) -> String {
        format!("{}. {self}", self.kind())
    }
}

impl Classify for PipelineError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Source(inner) => inner.kind(),
            Self::Processing(inner) => inner.kind(),
            Self::Embedding(inner) => inner.kind(),
            Self::VectorData(inner) => inner.kind(),
            Self::JobStore(inner) => inner.kind(),
            Self::StageTimeout { .. } => ErrorKind::Transient,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_leads_with_the_kind() {
        let error = PipelineError::Source(SourceError::Forbidden(
            "https://example.test/admin is disallowed by robots.txt".to_string(),
        ));
        let message = error.job_error_message();
        assert!(message.starts_with("Forbidden. "));
        assert!(message.contains("robots.txt"));
    }

    #[test]
    fn timeout_classifies_as_transient() {
        let error = PipelineError::StageTimeout {
            stage: StageKind::Embed,
        };
        assert_eq!(error.kind(), ErrorKind::Transient);
        assert!(error.job_error_message().starts_with("Transient. "));
    }
}
