//! Stage sequencing and durable state transitions
//!
//! The orchestrator owns a job from `PENDING` to its terminal state. It
//! drives the five stages strictly in order, updates the job record after
//! each one, emits telemetry, and funnels every stage error into a single
//! terminal transition. Mid-pipeline record updates are best-effort
//! (logged and swallowed); the terminal update is surfaced to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use docflow_common::{Classify, CorrelationId, ErrorKind};
use docflow_embeddings::{EmbedInput, EmbedStage};
use docflow_job_data::{JobPatch, JobStatus, JobStore};
use docflow_processing::{Chunk, CleanStage, Chunker};
use docflow_sources::{FetchContext, SourceParams, SourceRegistry};
use docflow_telemetry::{EventKind, TelemetryEvent, TelemetrySink};
use docflow_vector_data::{VectorRecord, VectorStorage};

use crate::error::{PipelineError, PipelineResult};
use crate::stage::StageKind;

/// Everything the orchestrator needs to run one job
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub tenant_id: String,
    pub source: String,
    pub params: SourceParams,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

/// Counters accumulated across one execution
#[derive(Debug, Default, Clone, Copy)]
struct ExecutionSummary {
    documents_fetched: usize,
    chunks_created: usize,
    embeddings_generated: usize,
    estimated_cost: f64,
}

/// The pipeline orchestrator
pub struct Orchestrator {
    job_store: Arc<dyn JobStore>,
    telemetry: Arc<dyn TelemetrySink>,
    registry: Arc<SourceRegistry>,
    clean: CleanStage,
    chunker: Arc<Chunker>,
    embed: Arc<EmbedStage>,
    vector_storage: Arc<dyn VectorStorage>,
    stage_timeout: Duration,
}

impl Orchestrator {
    /// Assemble the orchestrator from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_store: Arc<dyn JobStore>,
        telemetry: Arc<dyn TelemetrySink>,
        registry: Arc<SourceRegistry>,
        clean: CleanStage,
        chunker: Arc<Chunker>,
        embed: Arc<EmbedStage>,
        vector_storage: Arc<dyn VectorStorage>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            job_store,
            telemetry,
            registry,
            clean,
            chunker,
            embed,
            vector_storage,
            stage_timeout,
        }
    }

    /// Whether the downstream vector store is reachable
    pub async fn vector_store_healthy(&self) -> bool {
        self.vector_storage.health_check().await
    }

    /// Run one job to its terminal state
    ///
    /// # Errors
    ///
    /// Only the terminal job-record update is surfaced; every stage error
    /// is absorbed into the `FAILED`/`CANCELLED` transition itself.
    pub async fn run(&self, ctx: &JobContext) -> PipelineResult<()> {
        let span = tracing::info_span!(
            "run",
            job_id = %ctx.job_id,
            tenant_id = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
            source = %ctx.source
        );
        async move {
            match self.execute(ctx).await {
                Ok(summary) => self.finish_completed(ctx, summary).await,
                Err(error) if error.kind() == ErrorKind::Cancelled => {
                    self.finish_cancelled(ctx).await
                }
                Err(error) => self.finish_failed(ctx, &error).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, ctx: &JobContext) -> PipelineResult<ExecutionSummary> {
        let mut summary = ExecutionSummary::default();

        // FETCH
        self.begin_stage(ctx, StageKind::Fetch).await?;
        let started = Instant::now();
        let adapter = self.registry.get(&ctx.source)?;
        let fetch_ctx = FetchContext::new(
            &ctx.tenant_id,
            ctx.correlation_id.clone(),
            ctx.cancel.clone(),
        );
        let raw_documents = self
            .with_stage_timeout(StageKind::Fetch, Box::pin(async {
                adapter
                    .fetch(&fetch_ctx, &ctx.params)
                    .await
                    .map_err(PipelineError::from)
            }))
            .await?;
        summary.documents_fetched = raw_documents.len();
        self.complete_stage(
            ctx,
            StageKind::Fetch,
            started,
            raw_documents.len(),
            JobPatch {
                documents_stored: Some(raw_documents.len() as i64),
                ..JobPatch::default()
            },
        )
        .await;

        // CLEAN
        self.begin_stage(ctx, StageKind::Clean).await?;
        let started = Instant::now();
        let cleaned = self.clean.run(raw_documents);
        self.complete_stage(ctx, StageKind::Clean, started, cleaned.len(), JobPatch::default())
            .await;

        // CHUNK
        self.begin_stage(ctx, StageKind::Chunk).await?;
        let started = Instant::now();
        let chunks = self
            .with_stage_timeout(StageKind::Chunk, Box::pin(async {
                self.chunker
                    .chunk_documents(&cleaned, &ctx.cancel)
                    .await
                    .map_err(PipelineError::from)
            }))
            .await?;
        summary.chunks_created = chunks.len();
        self.complete_stage(
            ctx,
            StageKind::Chunk,
            started,
            chunks.len(),
            JobPatch {
                chunks_created: Some(chunks.len() as i64),
                ..JobPatch::default()
            },
        )
        .await;

        // EMBED
        self.begin_stage(ctx, StageKind::Embed).await?;
        let started = Instant::now();
        let inputs: Vec<EmbedInput> = chunks
            .iter()
            .map(|chunk| EmbedInput {
                chunk_id: chunk.chunk_id.clone(),
                content: chunk.content.clone(),
                token_count: chunk.token_count,
            })
            .collect();
        let embed_outcome = self
            .with_stage_timeout(StageKind::Embed, Box::pin(async {
                self.embed
                    .run(&inputs, &ctx.cancel)
                    .await
                    .map_err(PipelineError::from)
            }))
            .await?;
        summary.embeddings_generated = embed_outcome.embeddings.len();
        summary.estimated_cost = embed_outcome.total_cost;
        self.complete_stage(
            ctx,
            StageKind::Embed,
            started,
            embed_outcome.embeddings.len(),
            JobPatch {
                embeddings_generated: Some(embed_outcome.embeddings.len() as i64),
                ..JobPatch::default()
            },
        )
        .await;

        // STORE
        self.begin_stage(ctx, StageKind::Store).await?;
        let started = Instant::now();
        let records = build_records(&chunks, &embed_outcome.embeddings);
        let stored = self
            .with_stage_timeout(StageKind::Store, Box::pin(async {
                self.vector_storage
                    .upsert(&ctx.tenant_id, &records, &ctx.correlation_id)
                    .await
                    .map_err(PipelineError::from)
            }))
            .await?;
        self.complete_stage(ctx, StageKind::Store, started, stored, JobPatch::default())
            .await;

        Ok(summary)
    }

    /// Check cancellation, move the record to the stage's in-progress
    /// status, and emit `job_started` ahead of the first stage
    async fn begin_stage(&self, ctx: &JobContext, stage: StageKind) -> PipelineResult<()> {
        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.best_effort_update(ctx, JobPatch::status(stage.in_progress_status()))
            .await;

        if stage == StageKind::Fetch {
            let event = TelemetryEvent::new(
                EventKind::JobStarted,
                ctx.job_id,
                &ctx.tenant_id,
                ctx.correlation_id.as_str(),
            )
            .with_metric("source", ctx.source.clone());
            self.telemetry.emit(&event).await;
        }

        tracing::info!(stage = %stage, "stage starting");
        Ok(())
    }

    /// Record counters and the completed stage, then emit telemetry
    async fn complete_stage(
        &self,
        ctx: &JobContext,
        stage: StageKind,
        started: Instant,
        items_processed: usize,
        mut patch: JobPatch,
    ) {
        let duration_ms = started.elapsed().as_millis() as i64;
        patch.push_stage = Some(stage.name().to_string());
        self.best_effort_update(ctx, patch).await;

        let event = TelemetryEvent::new(
            EventKind::StageCompleted,
            ctx.job_id,
            &ctx.tenant_id,
            ctx.correlation_id.as_str(),
        )
        .with_metric("stage", stage.name())
        .with_metric("duration_ms", duration_ms)
        .with_metric("items_processed", items_processed);
        self.telemetry.emit(&event).await;

        tracing::info!(stage = %stage, duration_ms, items_processed, "stage completed");
    }

    /// Mid-pipeline updates never fail the job
    async fn best_effort_update(&self, ctx: &JobContext, patch: JobPatch) {
        if let Err(error) = self.job_store.update_job(&ctx.job_id, patch).await {
            tracing::warn!(%error, "mid-pipeline job update failed; continuing");
        }
    }

    async fn with_stage_timeout<T>(
        &self,
        stage: StageKind,
        work: std::pin::Pin<Box<dyn Future<Output = PipelineResult<T>> + Send + '_>>,
    ) -> PipelineResult<T> {
        match tokio::time::timeout(self.stage_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::StageTimeout { stage }),
        }
    }

    async fn finish_completed(
        &self,
        ctx: &JobContext,
        summary: ExecutionSummary,
    ) -> PipelineResult<()> {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - ctx.created_at).num_milliseconds();

        self.job_store
            .update_job(
                &ctx.job_id,
                JobPatch {
                    status: Some(JobStatus::Completed),
                    completed_at: Some(completed_at),
                    duration_ms: Some(duration_ms),
                    documents_stored: Some(summary.documents_fetched as i64),
                    ..JobPatch::default()
                },
            )
            .await?;

        let event = TelemetryEvent::new(
            EventKind::JobCompleted,
            ctx.job_id,
            &ctx.tenant_id,
            ctx.correlation_id.as_str(),
        )
        .with_metric("duration_ms", duration_ms)
        .with_metric("documents_stored", summary.documents_fetched)
        .with_metric("chunks_created", summary.chunks_created)
        .with_metric("embeddings_generated", summary.embeddings_generated)
        .with_metric("estimated_cost", summary.estimated_cost);
        self.telemetry.emit(&event).await;

        tracing::info!(
            documents = summary.documents_fetched,
            chunks = summary.chunks_created,
            embeddings = summary.embeddings_generated,
            duration_ms,
            "job completed"
        );
        Ok(())
    }

    async fn finish_failed(&self, ctx: &JobContext, error: &PipelineError) -> PipelineResult<()> {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - ctx.created_at).num_milliseconds();
        let message = error.job_error_message();

        tracing::error!(error = %message, "job failed");

        self.job_store
            .update_job(
                &ctx.job_id,
                JobPatch {
                    status: Some(JobStatus::Failed),
                    error_message: Some(message.clone()),
                    completed_at: Some(completed_at),
                    duration_ms: Some(duration_ms),
                    ..JobPatch::default()
                },
            )
            .await?;

        let event = TelemetryEvent::new(
            EventKind::JobFailed,
            ctx.job_id,
            &ctx.tenant_id,
            ctx.correlation_id.as_str(),
        )
        .with_metric("error_kind", error.kind().as_str())
        .with_metric("error_message", message)
        .with_metric("duration_ms", duration_ms);
        self.telemetry.emit(&event).await;
        Ok(())
    }

    async fn finish_cancelled(&self, ctx: &JobContext) -> PipelineResult<()> {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - ctx.created_at).num_milliseconds();

        self.job_store
            .update_job(
                &ctx.job_id,
                JobPatch {
                    status: Some(JobStatus::Cancelled),
                    completed_at: Some(completed_at),
                    duration_ms: Some(duration_ms),
                    ..JobPatch::default()
                },
            )
            .await?;

        tracing::info!(duration_ms, "job cancelled");
        Ok(())
    }
}

/// Zip chunks with their embeddings into storable records
fn build_records(
    chunks: &[Chunk],
    embeddings: &[docflow_embeddings::ChunkEmbedding],
) -> Vec<VectorRecord> {
    chunks
        .iter()
        .zip(embeddings.iter())
        .map(|(chunk, embedding)| {
            let mut metadata = chunk.metadata.clone();
            metadata.insert("document_id".to_string(), chunk.document_id.clone().into());
            metadata.insert("position".to_string(), chunk.position.into());
            metadata.insert("token_count".to_string(), chunk.token_count.into());
            metadata.insert("model_id".to_string(), embedding.model_id.clone().into());
            VectorRecord {
                chunk_id: chunk.chunk_id.clone(),
                vector: embedding.vector.clone(),
                content: chunk.content.clone(),
                metadata,
            }
        })
        .collect()
}
