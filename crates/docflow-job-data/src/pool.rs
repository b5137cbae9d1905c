//! Database connection pool management

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use docflow_config::DatabaseConfig;

use crate::error::{JobStoreError, JobStoreResult};

/// Create the job store connection pool
///
/// # Errors
///
/// Returns a pool error if the database is unreachable, credentials are
/// invalid, or the acquire timeout is exceeded.
pub async fn create_pool(config: &DatabaseConfig) -> JobStoreResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections())
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| {
            JobStoreError::Pool(format!(
                "failed to connect to {}: {e}",
                config.safe_connection_string()
            ))
        })
}

/// Run pending migrations against the pool
///
/// # Errors
///
/// Returns a migration error if any migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> JobStoreResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| JobStoreError::Migration(e.to_string()))
}

/// Create the pool and, when configured, bring the schema up to date
///
/// # Errors
///
/// Returns pool or migration errors (see [`create_pool`] and
/// [`run_migrations`]).
pub async fn initialize_database(config: &DatabaseConfig) -> JobStoreResult<PgPool> {
    let pool = create_pool(config).await?;
    if config.auto_migrate {
        run_migrations(&pool).await?;
    }
    Ok(pool)
}
