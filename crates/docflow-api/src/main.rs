//! Docflow API server
//!
//! Boots the full pipeline from environment configuration and serves the
//! submit/query façade.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use docflow_api::{AppState, create_router};
use docflow_config::ApplicationConfig;
use docflow_config::validation::Validate;
use docflow_embeddings::{EmbeddingProvider, HttpEmbeddingProvider};
use docflow_job_data::{JobStore, PgJobStore, initialize_database};
use docflow_pipeline::IngestionService;
use docflow_telemetry::{HttpTelemetrySink, NoopSink, TelemetrySink};
use docflow_vector_data::{QdrantStorage, VectorStorage};

type MainResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> MainResult {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting docflow API server...");

    let config = ApplicationConfig::from_env();
    config.validate()?;
    info!(
        database = %config.database.safe_connection_string(),
        vector_store = %config.vector_storage.base_url,
        "configuration loaded"
    );

    let pool = initialize_database(&config.database).await?;
    let job_store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

    let vector_storage: Arc<dyn VectorStorage> =
        Arc::new(QdrantStorage::new(&config.vector_storage).await?);

    let telemetry: Arc<dyn TelemetrySink> = HttpTelemetrySink::from_config(&config.telemetry)
        .map_or_else(
            || Arc::new(NoopSink) as Arc<dyn TelemetrySink>,
            |sink| Arc::new(sink) as Arc<dyn TelemetrySink>,
        );

    let embedding_provider: Arc<dyn EmbeddingProvider> =
        Arc::new(HttpEmbeddingProvider::new(&config.embedding)?);

    let service = Arc::new(IngestionService::build(
        &config,
        job_store,
        vector_storage,
        telemetry,
        embedding_provider,
    )?);

    let app = create_router(AppState::new(Arc::clone(&service)));

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await?;

    Ok(())
}

async fn shutdown_signal(service: Arc<IngestionService>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!(
        active_jobs = service.active_jobs(),
        "shutdown requested; draining in-flight jobs"
    );
    service.drain(Duration::from_secs(30)).await;
}
