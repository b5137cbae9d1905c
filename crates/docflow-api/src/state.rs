//! Shared application state for the HTTP surface

use std::sync::Arc;

use docflow_pipeline::IngestionService;

/// State handed to every route handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestionService>,
}

impl AppState {
    /// Wrap the pipeline service
    pub fn new(service: Arc<IngestionService>) -> Self {
        Self { service }
    }
}
