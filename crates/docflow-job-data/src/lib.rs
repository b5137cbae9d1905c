//! Durable job records for the ingestion pipeline
//!
//! One PostgreSQL table holds every job ever submitted; the orchestrator is
//! the only writer for a given job, and the API façade reads through the
//! same [`JobStore`] trait. Indexed lookups keep tenant-scoped listings
//! fast at millions of rows.

pub mod error;
pub mod mock;
pub mod models;
pub mod pool;
pub mod repository;
pub mod traits;

pub use error::{JobStoreError, JobStoreResult};
pub use models::{IngestionJob, JobFilter, JobPage, JobPatch, JobStatus, SourceKind};
pub use pool::{create_pool, initialize_database, run_migrations};
pub use repository::PgJobStore;
pub use traits::{JobStore, MAX_PAGE_SIZE};
