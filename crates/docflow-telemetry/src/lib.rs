//! Best-effort structured event emission for the pipeline
//!
//! The orchestrator emits `job_started`, `stage_completed`, `job_completed`
//! and `job_failed` events to an external HTTP collector. Transport
//! failures never affect a job's outcome.

pub mod event;
pub mod sink;

pub use event::{EventKind, TelemetryEvent};
pub use sink::{CapturingSink, HttpTelemetrySink, NoopSink, TelemetrySink};
