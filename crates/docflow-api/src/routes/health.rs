use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde_json::json;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.service.health().await;
    let healthy = health.job_store && health.vector_store;
    Json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "docflow-api",
        "job_store": health.job_store,
        "vector_store": health.vector_store,
        "active_jobs": state.service.active_jobs(),
    }))
}
