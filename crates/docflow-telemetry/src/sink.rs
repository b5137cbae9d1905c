//! Event sinks
//!
//! Emission is best-effort end to end: a telemetry outage must never change
//! a pipeline outcome, so `emit` is infallible and transport failures are
//! logged at warning level and dropped.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use docflow_config::TelemetryConfig;

use crate::event::TelemetryEvent;

/// Destination for pipeline events
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event; never fails the caller
    async fn emit(&self, event: &TelemetryEvent);
}

/// POSTs events as JSON to an external HTTP collector
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: String,
    service_name: String,
}

impl HttpTelemetrySink {
    /// Build a sink from configuration; returns `None` when no endpoint is
    /// configured
    pub fn from_config(config: &TelemetryConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .ok()?;
        Some(Self {
            client,
            endpoint,
            service_name: config.service_name.clone(),
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn emit(&self, event: &TelemetryEvent) {
        let payload = serde_json::json!({
            "service": self.service_name,
            "event": event,
        });

        let result = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        if let Err(error) = result {
            warn!(
                correlation_id = %event.correlation_id,
                job_id = %event.job_id,
                kind = %event.kind,
                %error,
                "telemetry emission failed; continuing"
            );
        }
    }
}

/// Discards every event; used when telemetry is not configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl TelemetrySink for NoopSink {
    async fn emit(&self, _event: &TelemetryEvent) {}
}

/// Records events in memory for assertions
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CapturingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in order
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TelemetrySink for CapturingSink {
    async fn emit(&self, event: &TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
