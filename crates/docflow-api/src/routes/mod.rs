//! Route assembly

pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// The complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(jobs::routes())
        .with_state(state)
}
