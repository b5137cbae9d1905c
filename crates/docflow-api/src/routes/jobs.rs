//! Job submission and query routes
//!
//! The façade stays thin: requests translate directly into
//! `IngestionService` calls. The tenant identifier arrives in the
//! `x-tenant-id` header, placed there by the authenticating proxy after
//! JWT validation; every query is scoped to that tenant.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get, routing::post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use docflow_job_data::{JobFilter, JobStatus};
use docflow_pipeline::SubmitRequest;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the validated tenant identifier
const TENANT_HEADER: &str = "x-tenant-id";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
}

fn tenant_from(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|tenant| !tenant.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(format!("missing {TENANT_HEADER} header")))
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    source: String,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    source_params: serde_json::Value,
    #[serde(default)]
    metadata: serde_json::Value,
}

async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = tenant_from(&headers)?;

    let source_params = match body.source_params {
        serde_json::Value::Null => json!({}),
        other => other,
    };
    let metadata = match body.metadata {
        serde_json::Value::Null => json!({}),
        other => other,
    };

    let job_id = state
        .service
        .submit(SubmitRequest {
            source: body.source,
            tenant_id,
            correlation_id: body.correlation_id,
            source_params,
            metadata,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = tenant_from(&headers)?;

    let job = state
        .service
        .get_job(&job_id)
        .await?
        // A foreign tenant's job is indistinguishable from a missing one
        .filter(|job| job.tenant_id == tenant_id)
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;

    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    created_before: Option<DateTime<Utc>>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    page_size: Option<u32>,
}

async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = tenant_from(&headers)?;

    let status = query
        .status
        .as_deref()
        .map(|raw| {
            raw.to_ascii_uppercase()
                .parse::<JobStatus>()
                .map_err(ApiError::bad_request)
        })
        .transpose()?;

    let filter = JobFilter {
        tenant_id: Some(tenant_id),
        status,
        created_after: query.created_after,
        created_before: query.created_before,
    };
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(50);

    let result = state.service.list_jobs(&filter, page, page_size).await?;
    Ok(Json(json!({
        "jobs": result.jobs,
        "total": result.total,
        "page": page,
        "page_size": page_size,
    })))
}

async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = tenant_from(&headers)?;

    let owned = state
        .service
        .get_job(&job_id)
        .await?
        .is_some_and(|job| job.tenant_id == tenant_id);
    if !owned {
        return Err(ApiError::not_found(format!("job {job_id} not found")));
    }

    if state.service.cancel(&job_id) {
        Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id, "cancelling": true }))))
    } else {
        Err(ApiError::not_found(format!(
            "job {job_id} is not running on this node"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_header_is_required_and_trimmed() {
        let mut headers = HeaderMap::new();
        assert!(tenant_from(&headers).is_err());

        headers.insert(TENANT_HEADER, "  tenant-a  ".parse().unwrap());
        assert_eq!(tenant_from(&headers).unwrap(), "tenant-a");

        headers.insert(TENANT_HEADER, "   ".parse().unwrap());
        assert!(tenant_from(&headers).is_err());
    }
}
