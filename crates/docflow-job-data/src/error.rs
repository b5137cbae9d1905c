//! Structured error handling for the job store
//!
//! Every database failure carries the operation it happened during, so a
//! log line is enough to reconstruct what the store was doing.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use docflow_common::{Cancelled, Classify, ErrorKind};

/// Result type alias for job store operations
pub type JobStoreResult<T> = std::result::Result<T, JobStoreError>;

/// Job store operation for error context
#[derive(Debug, Clone)]
pub enum JobStoreOperation {
    CreateJob { job_id: Uuid },
    GetJob { job_id: Uuid },
    UpdateJob { job_id: Uuid },
    ListJobs,
    HealthCheck,
    Migration,
}

impl fmt::Display for JobStoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateJob { job_id } => write!(f, "create_job(job={job_id})"),
            Self::GetJob { job_id } => write!(f, "get_job(job={job_id})"),
            Self::UpdateJob { job_id } => write!(f, "update_job(job={job_id})"),
            Self::ListJobs => write!(f, "list_jobs"),
            Self::HealthCheck => write!(f, "health_check"),
            Self::Migration => write!(f, "migration"),
        }
    }
}

/// Errors surfaced by the job store
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// A record with this `job_id` already exists
    #[error("Job {job_id} already exists")]
    Conflict { job_id: Uuid },

    /// Underlying database failure, with the operation that hit it
    #[error("Database error during {operation}: {source}")]
    Query {
        operation: JobStoreOperation,
        #[source]
        source: sqlx::Error,
    },

    /// Pool construction or acquisition failure
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Migration failure at startup
    #[error("Migration error: {0}")]
    Migration(String),

    /// Cancellation observed while waiting on the store
    #[error("Job store operation cancelled")]
    Cancelled,
}

impl Classify for JobStoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } => ErrorKind::Validation,
            Self::Query { .. } | Self::Pool(_) => ErrorKind::Transient,
            Self::Migration(_) => ErrorKind::Internal,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<Cancelled> for JobStoreError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Extension trait attaching operation context to raw sqlx errors
pub trait JobStoreErrorExt<T> {
    /// Wrap a sqlx error with the operation it occurred in
    fn map_store_err(self, operation: JobStoreOperation) -> JobStoreResult<T>;
}

impl<T> JobStoreErrorExt<T> for Result<T, sqlx::Error> {
    fn map_store_err(self, operation: JobStoreOperation) -> JobStoreResult<T> {
        self.map_err(|source| JobStoreError::Query { operation, source })
    }
}
