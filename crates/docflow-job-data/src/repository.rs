//! PostgreSQL-backed job store
//!
//! Every update is a single-row statement; the orchestrator serializes
//! updates for one job, so no multi-row transactions are needed here.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::{JobStoreErrorExt, JobStoreOperation, JobStoreResult};
use crate::models::{IngestionJob, JobFilter, JobPage, JobPatch, JobStatus, SourceKind};
use crate::traits::{JobStore, MAX_PAGE_SIZE};

/// Job store backed by PostgreSQL via sqlx
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Wrap an existing connection pool
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (shared with health checks)
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn job_from_row(row: &PgRow) -> Result<IngestionJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let source: String = row.try_get("source")?;
    Ok(IngestionJob {
        job_id: row.try_get("job_id")?,
        correlation_id: row.try_get("correlation_id")?,
        tenant_id: row.try_get("tenant_id")?,
        source: SourceKind::from(source),
        status: JobStatus::from(status),
        source_params: row.try_get("source_params")?,
        metadata: row.try_get("metadata")?,
        documents_stored: row.try_get("documents_stored")?,
        chunks_created: row.try_get("chunks_created")?,
        embeddings_generated: row.try_get("embeddings_generated")?,
        stages_completed: row.try_get("stages_completed")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id, tenant_id = %job.tenant_id))]
    async fn create_job(&self, job: &IngestionJob) -> JobStoreResult<()> {
        let operation = JobStoreOperation::CreateJob { job_id: job.job_id };

        let result = sqlx::query(
            r"
            INSERT INTO ingestion_jobs (
                job_id, correlation_id, tenant_id, source, status,
                source_params, metadata,
                documents_stored, chunks_created, embeddings_generated,
                stages_completed, error_message,
                created_at, completed_at, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(job.job_id)
        .bind(&job.correlation_id)
        .bind(&job.tenant_id)
        .bind(job.source.to_string())
        .bind(job.status.to_string())
        .bind(&job.source_params)
        .bind(&job.metadata)
        .bind(job.documents_stored)
        .bind(job.chunks_created)
        .bind(job.embeddings_generated)
        .bind(&job.stages_completed)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.completed_at)
        .bind(job.duration_ms)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(crate::error::JobStoreError::Conflict { job_id: job.job_id })
            }
            Err(source) => Err(crate::error::JobStoreError::Query { operation, source }),
        }
    }

    async fn get_job(&self, job_id: &Uuid) -> JobStoreResult<Option<IngestionJob>> {
        let operation = JobStoreOperation::GetJob { job_id: *job_id };

        let row = sqlx::query("SELECT * FROM ingestion_jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_store_err(operation.clone())?;

        row.map(|r| job_from_row(&r))
            .transpose()
            .map_store_err(operation)
    }

    #[tracing::instrument(skip(self, patch), fields(job_id = %job_id))]
    async fn update_job(
        &self,
        job_id: &Uuid,
        patch: JobPatch,
    ) -> JobStoreResult<Option<IngestionJob>> {
        let operation = JobStoreOperation::UpdateJob { job_id: *job_id };

        let row = sqlx::query(
            r"
            UPDATE ingestion_jobs SET
                status               = COALESCE($2::TEXT, status),
                error_message        = COALESCE($3::TEXT, error_message),
                completed_at         = COALESCE($4::TIMESTAMPTZ, completed_at),
                duration_ms          = COALESCE($5::BIGINT, duration_ms),
                documents_stored     = COALESCE($6::BIGINT, documents_stored),
                chunks_created       = COALESCE($7::BIGINT, chunks_created),
                embeddings_generated = COALESCE($8::BIGINT, embeddings_generated),
                stages_completed     = CASE
                    WHEN $9::TEXT IS NULL THEN stages_completed
                    ELSE array_append(stages_completed, $9::TEXT)
                END
            WHERE job_id = $1
            RETURNING *
            ",
        )
        .bind(job_id)
        .bind(patch.status.map(|s| s.to_string()))
        .bind(patch.error_message)
        .bind(patch.completed_at)
        .bind(patch.duration_ms)
        .bind(patch.documents_stored)
        .bind(patch.chunks_created)
        .bind(patch.embeddings_generated)
        .bind(patch.push_stage)
        .fetch_optional(&self.pool)
        .await
        .map_store_err(operation.clone())?;

        row.map(|r| job_from_row(&r))
            .transpose()
            .map_store_err(operation)
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: u32,
        page_size: u32,
    ) -> JobStoreResult<JobPage> {
        let operation = JobStoreOperation::ListJobs;
        let limit = i64::from(page_size.clamp(1, MAX_PAGE_SIZE));
        let offset = i64::from(page.max(1) - 1) * limit;

        fn push_filter<'a>(builder: &mut QueryBuilder<'a, sqlx::Postgres>, filter: &'a JobFilter) {
            if let Some(tenant_id) = &filter.tenant_id {
                builder.push(" AND tenant_id = ").push_bind(tenant_id);
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status.to_string());
            }
            if let Some(after) = filter.created_after {
                builder.push(" AND created_at >= ").push_bind(after);
            }
            if let Some(before) = filter.created_before {
                builder.push(" AND created_at <= ").push_bind(before);
            }
        }

        let mut count_builder =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM ingestion_jobs WHERE 1=1");
        push_filter(&mut count_builder, filter);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_store_err(operation.clone())?
            .get("total");

        let mut builder = QueryBuilder::new("SELECT * FROM ingestion_jobs WHERE 1=1");
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_store_err(operation.clone())?;

        let jobs = rows
            .iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_store_err(operation)?;

        Ok(JobPage { jobs, total })
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
