//! Store abstraction for durable job records
//!
//! The orchestrator and the API façade only ever see this trait; the
//! PostgreSQL implementation and the in-memory test double are
//! interchangeable behind it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::JobStoreResult;
use crate::models::{IngestionJob, JobFilter, JobPage, JobPatch};

/// Page size ceiling for [`JobStore::list_jobs`]
pub const MAX_PAGE_SIZE: u32 = 1_000;

/// Durable, queryable, multi-tenant job record store
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job record
    ///
    /// # Errors
    ///
    /// Returns `JobStoreError::Conflict` if the `job_id` already exists,
    /// or a query error on storage failure.
    async fn create_job(&self, job: &IngestionJob) -> JobStoreResult<()>;

    /// Point lookup by job id
    ///
    /// # Errors
    ///
    /// Returns a query error on storage failure.
    async fn get_job(&self, job_id: &Uuid) -> JobStoreResult<Option<IngestionJob>>;

    /// Partial single-row update; returns the updated record, or `None`
    /// (no-op) when the job does not exist
    ///
    /// # Errors
    ///
    /// Returns a query error on storage failure.
    async fn update_job(&self, job_id: &Uuid, patch: JobPatch)
    -> JobStoreResult<Option<IngestionJob>>;

    /// List jobs matching the filter, newest first
    ///
    /// `page` is 1-based; `page_size` is clamped to [`MAX_PAGE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns a query error on storage failure.
    async fn list_jobs(&self, filter: &JobFilter, page: u32, page_size: u32)
    -> JobStoreResult<JobPage>;

    /// Whether the store can currently serve queries
    async fn health_check(&self) -> bool;
}
