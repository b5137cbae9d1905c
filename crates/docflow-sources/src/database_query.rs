//! Database query adapter
//!
//! Runs caller-supplied read-only queries against PostgreSQL, MySQL, or
//! SQLite through the sqlx `Any` driver, with one cached connection pool
//! per connection string. Parameters bind through the driver - never by
//! interpolation - and the read-only guard rejects mutating statements
//! before any engine is opened. Connection strings are only ever logged
//! with their password masked.

use std::sync::Once;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row};

use docflow_config::{DB_QUERY_ROW_HARD_CAP, DbQueryConfig, mask_connection_string};
use docflow_processing::RawDocument;

use crate::adapter::{FetchContext, SourceAdapter, base_metadata, content_digest, ensure_unique_document_ids};
use crate::error::{SourceError, SourceResult};
use crate::params::{DatabaseQueryParams, SourceParams};
use crate::sql_guard::{PlaceholderStyle, rewrite_named_params, validate_read_only};

/// Column names probed for content when no `content_column` is given
const CONTENT_FALLBACKS: &[&str] = &["content", "body", "text", "description", "message"];

static INSTALL_DRIVERS: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineFamily {
    Postgres,
    MySql,
    Sqlite,
}

impl EngineFamily {
    fn from_connection_string(connection_string: &str) -> SourceResult<Self> {
        let scheme = connection_string
            .split(':')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(SourceError::Validation(format!(
                "unsupported database scheme: {other:?}"
            ))),
        }
    }

    const fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::Postgres => PlaceholderStyle::Dollar,
            Self::MySql | Self::Sqlite => PlaceholderStyle::Question,
        }
    }
}

/// Source adapter for `database_query` jobs
pub struct DatabaseQueryAdapter {
    pools: DashMap<String, AnyPool>,
    config: DbQueryConfig,
}

impl DatabaseQueryAdapter {
    /// Adapter with an empty engine cache
    pub fn new(config: DbQueryConfig) -> Self {
        Self {
            pools: DashMap::new(),
            config,
        }
    }

    /// Number of cached engines (observable in tests)
    pub fn cached_engines(&self) -> usize {
        self.pools.len()
    }

    /// Close every cached pool; called on shutdown
    pub async fn shutdown(&self) {
        for entry in &self.pools {
            entry.value().close().await;
        }
        self.pools.clear();
    }

    fn expect_params<'a>(params: &'a SourceParams) -> SourceResult<&'a DatabaseQueryParams> {
        match params {
            SourceParams::DatabaseQuery(p) => Ok(p),
            other => Err(SourceError::Validation(format!(
                "database_query adapter received {} parameters",
                other.source()
            ))),
        }
    }

    async fn pool_for(&self, connection_string: &str) -> SourceResult<AnyPool> {
        if let Some(pool) = self.pools.get(connection_string) {
            return Ok(pool.clone());
        }

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let masked = mask_connection_string(connection_string);
        tracing::info!(connection = %masked, "opening database engine");
        let pool = AnyPoolOptions::new()
            .max_connections(4)
            .connect(connection_string)
            .await
            .map_err(|e| SourceError::Transient(format!("failed to connect to {masked}: {e}")))?;

        self.pools
            .insert(connection_string.to_string(), pool.clone());
        Ok(pool)
    }

    async fn apply_statement_timeout(
        &self,
        conn: &mut sqlx::pool::PoolConnection<sqlx::Any>,
        family: EngineFamily,
    ) -> SourceResult<()> {
        let millis = self.config.statement_timeout.as_millis();
        let statement = match family {
            EngineFamily::Postgres => Some(format!("SET statement_timeout = {millis}")),
            EngineFamily::MySql => Some(format!("SET SESSION max_execution_time = {millis}")),
            // SQLite has no statement timeout; cancellation covers it
            EngineFamily::Sqlite => None,
        };
        if let Some(statement) = statement {
            sqlx::query(&statement)
                .execute(&mut **conn)
                .await
                .map_err(|e| {
                    SourceError::Transient(format!("failed to set statement timeout: {e}"))
                })?;
        }
        Ok(())
    }

    fn row_to_document(
        ctx: &FetchContext,
        p: &DatabaseQueryParams,
        row: &AnyRow,
    ) -> RawDocument {
        let mut fields = serde_json::Map::new();
        for (index, column) in row.columns().iter().enumerate() {
            fields.insert(column.name().to_string(), any_value_to_json(row, index));
        }
        let row_json = serde_json::Value::Object(fields.clone()).to_string();

        // Content: configured column, then the conventional fallbacks,
        // then the whole row as JSON
        let content_key = p
            .content_column
            .clone()
            .filter(|column| fields.contains_key(column))
            .or_else(|| {
                CONTENT_FALLBACKS
                    .iter()
                    .find(|column| fields.contains_key(**column))
                    .map(|column| (*column).to_string())
            });
        let content = content_key.as_ref().map_or_else(
            || row_json.clone(),
            |key| fields.get(key).map(json_text).unwrap_or_default(),
        );

        let id_value = p
            .id_column
            .as_deref()
            .and_then(|column| fields.get(column))
            .filter(|value| !value.is_null())
            .map(json_text);
        let document_id = id_value
            .clone()
            .map_or_else(|| format!("row-{}", content_digest(&row_json)), |id| id);

        let mut metadata = base_metadata("database_query");
        if let Some(id) = id_value {
            metadata.insert("db_row_id".to_string(), id.into());
        }
        if let Some(title_column) = p.title_column.as_deref() {
            if let Some(title) = fields.get(title_column) {
                if !title.is_null() {
                    metadata.insert("title".to_string(), json_text(title).into());
                }
            }
        }
        for (name, value) in fields {
            if Some(name.as_str()) == content_key.as_deref() {
                continue;
            }
            metadata.entry(name).or_insert(value);
        }

        RawDocument::new(document_id, content, metadata, ctx.tenant_id.clone())
    }
}

#[async_trait]
impl SourceAdapter for DatabaseQueryAdapter {
    fn source(&self) -> &'static str {
        "database_query"
    }

    fn validate(&self, params: &SourceParams) -> SourceResult<()> {
        let p = Self::expect_params(params)?;

        EngineFamily::from_connection_string(&p.connection_string)?;
        if p.query.trim().is_empty() {
            return Err(SourceError::Validation("query is required".to_string()));
        }
        if self.config.read_only {
            validate_read_only(&p.query)?;
        }
        if let Some(max_rows) = p.max_rows {
            if max_rows == 0 || max_rows > DB_QUERY_ROW_HARD_CAP {
                return Err(SourceError::Validation(format!(
                    "max_rows must be within 1..={DB_QUERY_ROW_HARD_CAP}, got {max_rows}"
                )));
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx, params), fields(correlation_id = %ctx.correlation_id))]
    async fn fetch(
        &self,
        ctx: &FetchContext,
        params: &SourceParams,
    ) -> SourceResult<Vec<RawDocument>> {
        let p = Self::expect_params(params)?;
        // The guard runs before any engine is opened
        self.validate(params)?;

        let family = EngineFamily::from_connection_string(&p.connection_string)?;
        let pool = self.pool_for(&p.connection_string).await?;
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| SourceError::Transient(format!("failed to acquire connection: {e}")))?;
        self.apply_statement_timeout(&mut conn, family).await?;

        let (rewritten, names) = rewrite_named_params(&p.query, family.placeholder_style());
        let mut query = sqlx::query(&rewritten);
        for name in &names {
            let value = p.params.get(name).ok_or_else(|| {
                SourceError::Validation(format!("missing value for query parameter :{name}"))
            })?;
            query = match value {
                serde_json::Value::Null => query.bind(None::<String>),
                serde_json::Value::Bool(flag) => query.bind(*flag),
                serde_json::Value::Number(number) => match number.as_i64() {
                    Some(int) => query.bind(int),
                    None => query.bind(number.as_f64().unwrap_or_default()),
                },
                serde_json::Value::String(text) => query.bind(text.clone()),
                other => query.bind(other.to_string()),
            };
        }

        let max_rows = p
            .max_rows
            .unwrap_or(self.config.max_rows)
            .min(DB_QUERY_ROW_HARD_CAP) as usize;

        let mut stream = query.fetch(&mut *conn);
        let mut documents = Vec::new();
        while documents.len() < max_rows {
            let next = tokio::select! {
                () = ctx.cancel.cancelled() => return Err(SourceError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(row)) => documents.push(Self::row_to_document(ctx, p, &row)),
                Some(Err(e)) => {
                    return Err(SourceError::Transient(format!("query failed: {e}")));
                }
                None => break,
            }
        }
        drop(stream);

        ensure_unique_document_ids(&mut documents);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            rows = documents.len(),
            connection = %mask_connection_string(&p.connection_string),
            "database query fetch complete"
        );
        Ok(documents)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["text/plain", "application/json"]
    }
}

/// Render one column value as text
fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode an `Any` row column into JSON by probing the narrow set of
/// types the Any driver supports; undecodable values become null
fn any_value_to_json(row: &AnyRow, index: usize) -> serde_json::Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(serde_json::Value::Null, serde_json::Value::from);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(serde_json::Value::Null, serde_json::Value::from);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map_or(serde_json::Value::Null, serde_json::Value::from);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(serde_json::Value::Null, serde_json::Value::from);
    }
    serde_json::Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_common::CorrelationId;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn config() -> DbQueryConfig {
        DbQueryConfig {
            read_only: true,
            statement_timeout: Duration::from_secs(30),
            max_rows: 1_000,
        }
    }

    fn ctx() -> FetchContext {
        FetchContext::new("tenant-a", CorrelationId::new(), CancellationToken::new())
    }

    fn params(connection_string: &str, query: &str) -> DatabaseQueryParams {
        DatabaseQueryParams {
            connection_string: connection_string.to_string(),
            query: query.to_string(),
            params: serde_json::Map::new(),
            content_column: None,
            title_column: None,
            id_column: None,
            max_rows: None,
        }
    }

    async fn seeded_sqlite() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let setup = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .expect("sqlite connect");
        sqlx::query(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL, author TEXT, stars INTEGER)",
        )
        .execute(&setup)
        .await
        .expect("create table");
        for (id, body, author, stars) in [
            (1, "first note body", "sam", 3),
            (2, "second note body", "kim", 5),
            (3, "third note body", "sam", 1),
        ] {
            sqlx::query("INSERT INTO notes (id, body, author, stars) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(body)
                .bind(author)
                .bind(stars)
                .execute(&setup)
                .await
                .expect("insert row");
        }
        setup.close().await;

        (dir, url)
    }

    #[tokio::test]
    async fn read_only_violation_never_opens_an_engine() {
        let adapter = DatabaseQueryAdapter::new(config());
        let result = adapter
            .fetch(
                &ctx(),
                &SourceParams::DatabaseQuery(params("sqlite:///t.db", "DROP TABLE users")),
            )
            .await;

        assert!(matches!(result, Err(SourceError::Forbidden(_))));
        assert_eq!(adapter.cached_engines(), 0);
    }

    #[tokio::test]
    async fn rows_become_documents_with_fallback_content_column() {
        let (_dir, url) = seeded_sqlite().await;
        let adapter = DatabaseQueryAdapter::new(config());

        let mut p = params(&url, "SELECT id, body, author, stars FROM notes ORDER BY id");
        p.id_column = Some("id".to_string());

        let docs = adapter
            .fetch(&ctx(), &SourceParams::DatabaseQuery(p))
            .await
            .unwrap();

        assert_eq!(docs.len(), 3);
        // "body" is in the conventional fallback chain
        assert_eq!(docs[0].content, "first note body");
        assert_eq!(docs[0].document_id, "1");
        assert_eq!(docs[0].metadata.get("author").and_then(|v| v.as_str()), Some("sam"));
        assert_eq!(docs[0].metadata.get("stars").and_then(serde_json::Value::as_i64), Some(3));
        assert_eq!(docs[0].metadata.get("db_row_id").and_then(|v| v.as_str()), Some("1"));
        // Content column does not repeat in metadata
        assert!(!docs[0].metadata.contains_key("body"));
    }

    #[tokio::test]
    async fn named_parameters_bind_through_the_driver() {
        let (_dir, url) = seeded_sqlite().await;
        let adapter = DatabaseQueryAdapter::new(config());

        let mut p = params(
            &url,
            "SELECT id, body FROM notes WHERE author = :author ORDER BY id",
        );
        p.params
            .insert("author".to_string(), serde_json::Value::from("sam"));

        let docs = adapter
            .fetch(&ctx(), &SourceParams::DatabaseQuery(p))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn missing_parameter_value_is_a_validation_error() {
        let (_dir, url) = seeded_sqlite().await;
        let adapter = DatabaseQueryAdapter::new(config());

        let p = params(&url, "SELECT id FROM notes WHERE author = :author");
        let result = adapter.fetch(&ctx(), &SourceParams::DatabaseQuery(p)).await;
        assert!(matches!(result, Err(SourceError::Validation(_))));
    }

    #[tokio::test]
    async fn max_rows_caps_the_result() {
        let (_dir, url) = seeded_sqlite().await;
        let adapter = DatabaseQueryAdapter::new(config());

        let mut p = params(&url, "SELECT id, body FROM notes ORDER BY id");
        p.max_rows = Some(2);

        let docs = adapter
            .fetch(&ctx(), &SourceParams::DatabaseQuery(p))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn rows_without_conventional_columns_serialize_to_json() {
        let (_dir, url) = seeded_sqlite().await;
        let adapter = DatabaseQueryAdapter::new(config());

        let p = params(&url, "SELECT id, stars FROM notes WHERE id = 1");
        let docs = adapter
            .fetch(&ctx(), &SourceParams::DatabaseQuery(p))
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&docs[0].content).unwrap();
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["stars"], 3);
        // No id_column given: the id falls back to a deterministic hash
        assert!(docs[0].document_id.starts_with("row-"));
    }

    #[tokio::test]
    async fn engine_cache_reuses_pools() {
        let (_dir, url) = seeded_sqlite().await;
        let adapter = DatabaseQueryAdapter::new(config());

        for _ in 0..2 {
            adapter
                .fetch(
                    &ctx(),
                    &SourceParams::DatabaseQuery(params(&url, "SELECT id, body FROM notes")),
                )
                .await
                .unwrap();
        }
        assert_eq!(adapter.cached_engines(), 1);
        adapter.shutdown().await;
        assert_eq!(adapter.cached_engines(), 0);
    }

    #[tokio::test]
    async fn unsupported_scheme_is_a_validation_error() {
        let adapter = DatabaseQueryAdapter::new(config());
        let result = adapter.validate(&SourceParams::DatabaseQuery(params(
            "mongodb://localhost/db",
            "SELECT 1",
        )));
        assert!(matches!(result, Err(SourceError::Validation(_))));
    }
}
