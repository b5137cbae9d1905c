//! Job submission, worker capping, and cancellation
//!
//! `IngestionService` is the single entry point the HTTP façade talks to:
//! it validates a submission before any record exists, creates the
//! `PENDING` job, and hands execution to a background task gated by the
//! process-wide worker semaphore.
//!
//! Jobs are owned by the node that accepted them: durable state permits a
//! restarted node to inspect where a job stopped, but no second node ever
//! picks one up (single-writer deployment).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docflow_common::{CorrelationId, RateLimiter, RetryPolicy};
use docflow_config::ApplicationConfig;
use docflow_embeddings::{EmbedStage, EmbeddingProvider};
use docflow_job_data::{IngestionJob, JobFilter, JobPage, JobStore, SourceKind};
use docflow_processing::{CleanStage, Chunker};
use docflow_sources::{
    ApiFetchAdapter, DatabaseQueryAdapter, FileUploadAdapter, SecEdgarAdapter, SourceParams,
    SourceRegistry, UrlScrapeAdapter,
};
use docflow_telemetry::TelemetrySink;
use docflow_vector_data::VectorStorage;

use crate::error::PipelineResult;
use crate::orchestrator::{JobContext, Orchestrator};

/// One job submission, as translated by the HTTP façade
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub source: String,
    pub tenant_id: String,
    /// Free-form tracing tag; generated when absent
    pub correlation_id: Option<String>,
    /// Opaque adapter parameters, validated before the job is created
    pub source_params: serde_json::Value,
    /// Caller metadata stored on the record as-is
    pub metadata: serde_json::Value,
}

/// Backing-service reachability, reported by the health endpoint
#[derive(Debug, Clone, Copy)]
pub struct ServiceHealth {
    pub job_store: bool,
    pub vector_store: bool,
}

/// The pipeline's submission and lifecycle surface
pub struct IngestionService {
    orchestrator: Arc<Orchestrator>,
    job_store: Arc<dyn JobStore>,
    registry: Arc<SourceRegistry>,
    workers: Arc<Semaphore>,
    cancellations: Arc<DashMap<Uuid, CancellationToken>>,
}

impl IngestionService {
    /// Assemble from pre-built collaborators
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        job_store: Arc<dyn JobStore>,
        registry: Arc<SourceRegistry>,
        max_workers: usize,
    ) -> Self {
        Self {
            orchestrator,
            job_store,
            registry,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            cancellations: Arc::new(DashMap::new()),
        }
    }

    /// Build the full pipeline from configuration: all five adapters, the
    /// clean/chunk/embed stages, the orchestrator, and the service itself
    ///
    /// # Errors
    ///
    /// Returns adapter or tokenizer construction errors.
    pub fn build(
        config: &ApplicationConfig,
        job_store: Arc<dyn JobStore>,
        vector_storage: Arc<dyn VectorStorage>,
        telemetry: Arc<dyn TelemetrySink>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> PipelineResult<Self> {
        let retry = RetryPolicy::default();

        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(FileUploadAdapter::new(
            config.adapters.file_upload.clone(),
        )));
        registry.register(Arc::new(SecEdgarAdapter::new(
            config.adapters.sec_edgar.clone(),
            retry.clone(),
        )?));
        registry.register(Arc::new(UrlScrapeAdapter::new(
            config.adapters.url_scrape.clone(),
            retry.clone(),
        )?));
        registry.register(Arc::new(ApiFetchAdapter::new(
            &config.adapters.api_fetch,
            retry.clone(),
        )?));
        registry.register(Arc::new(DatabaseQueryAdapter::new(
            config.adapters.database_query.clone(),
        )));
        let registry = Arc::new(registry);

        let clean = CleanStage::new(config.chunking.min_document_chars);
        let chunker = Arc::new(Chunker::from_config(
            config.chunking.clone(),
            Some(Arc::clone(&embedding_provider)),
        )?);
        let embed = Arc::new(EmbedStage::new(
            embedding_provider,
            Arc::new(RateLimiter::new(config.embedding.rate_limit)),
            retry,
            &config.embedding,
            config.orchestration.embed_max_workers,
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&job_store),
            telemetry,
            Arc::clone(&registry),
            clean,
            chunker,
            embed,
            vector_storage,
            config.orchestration.stage_timeout,
        ));

        Ok(Self::new(
            orchestrator,
            job_store,
            registry,
            config.orchestration.max_workers,
        ))
    }

    /// Validate and accept a job, spawning its execution in the background
    ///
    /// # Errors
    ///
    /// Returns validation errors before any record exists, and job-store
    /// errors (including duplicate submissions) from record creation.
    pub async fn submit(&self, request: SubmitRequest) -> PipelineResult<Uuid> {
        // Typed parse + adapter validation happen before create_job, so a
        // bad submission never leaves a FAILED record behind
        let params = SourceParams::parse(&request.source, &request.source_params)?;
        let adapter = self.registry.get(&request.source)?;
        adapter.validate(&params)?;
        let source: SourceKind = request
            .source
            .parse()
            .map_err(docflow_sources::SourceError::Validation)?;

        let correlation_id = request
            .correlation_id
            .as_deref()
            .map_or_else(CorrelationId::new, CorrelationId::from);

        let job = IngestionJob::new(
            Uuid::new_v4(),
            correlation_id.to_string(),
            request.tenant_id.clone(),
            source,
            request.source_params,
            request.metadata,
        );
        self.job_store.create_job(&job).await?;

        let cancel = CancellationToken::new();
        self.cancellations.insert(job.job_id, cancel.clone());

        let ctx = JobContext {
            job_id: job.job_id,
            tenant_id: request.tenant_id,
            source: request.source,
            params,
            correlation_id: correlation_id.clone(),
            created_at: job.created_at,
            cancel,
        };

        tracing::info!(
            job_id = %job.job_id,
            correlation_id = %correlation_id,
            source = %ctx.source,
            "job accepted"
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let workers = Arc::clone(&self.workers);
        let cancellations = Arc::clone(&self.cancellations);
        tokio::spawn(async move {
            let job_id = ctx.job_id;
            // Hold a worker slot for the whole execution
            match workers.acquire().await {
                Ok(_permit) => {
                    if let Err(error) = orchestrator.run(&ctx).await {
                        tracing::error!(%job_id, %error, "terminal job update failed");
                    }
                }
                Err(_) => {
                    tracing::error!(%job_id, "worker semaphore closed; job not executed");
                }
            }
            cancellations.remove(&job_id);
        });

        Ok(job.job_id)
    }

    /// Signal cancellation for a running job; false when the job is not
    /// executing on this node
    pub fn cancel(&self, job_id: &Uuid) -> bool {
        self.cancellations.get(job_id).is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Jobs currently executing (or queued for a worker slot) here
    pub fn active_jobs(&self) -> usize {
        self.cancellations.len()
    }

    /// Point lookup on the job store
    ///
    /// # Errors
    ///
    /// Returns job-store errors.
    pub async fn get_job(&self, job_id: &Uuid) -> PipelineResult<Option<IngestionJob>> {
        Ok(self.job_store.get_job(job_id).await?)
    }

    /// Filtered, paginated job listing
    ///
    /// # Errors
    ///
    /// Returns job-store errors.
    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: u32,
        page_size: u32,
    ) -> PipelineResult<JobPage> {
        Ok(self.job_store.list_jobs(filter, page, page_size).await?)
    }

    /// Reachability of the backing services
    pub async fn health(&self) -> ServiceHealth {
        ServiceHealth {
            job_store: self.job_store.health_check().await,
            vector_store: self.orchestrator.vector_store_healthy().await,
        }
    }

    /// Wait for in-flight jobs to settle, up to the deadline; used by
    /// graceful shutdown
    pub async fn drain(&self, deadline: Duration) {
        let started = tokio::time::Instant::now();
        while self.active_jobs() > 0 && started.elapsed() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
