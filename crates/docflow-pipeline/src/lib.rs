//! Pipeline orchestration
//!
//! Ties the source adapters, processing stages, embedding stage, and
//! vector storage together behind one submission surface. Each accepted
//! job runs FETCH -> CLEAN -> CHUNK -> EMBED -> STORE on its own task,
//! with durable status transitions and per-stage telemetry.

pub mod error;
pub mod orchestrator;
pub mod service;
pub mod stage;

pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{JobContext, Orchestrator};
pub use service::{IngestionService, ServiceHealth, SubmitRequest};
pub use stage::StageKind;
