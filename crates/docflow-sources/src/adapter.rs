//! The source-adapter contract
//!
//! Every source implements the same capability set; the orchestrator picks
//! an adapter by the job's source tag and drives it through this trait.
//! Adapters are constructed once per source with their expensive resources
//! (HTTP clients, SQL engine caches) and reused across jobs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use docflow_common::CorrelationId;
use docflow_processing::{Metadata, RawDocument};

use crate::error::{SourceError, SourceResult};
use crate::params::SourceParams;

/// Per-job context handed to every fetch
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub tenant_id: String,
    pub correlation_id: CorrelationId,
    pub cancel: CancellationToken,
}

impl FetchContext {
    /// Context for a job
    pub fn new(tenant_id: &str, correlation_id: CorrelationId, cancel: CancellationToken) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            correlation_id,
            cancel,
        }
    }
}

/// Capability set every source adapter provides
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source tag this adapter serves
    fn source(&self) -> &'static str;

    /// Reject bad parameters before any I/O happens
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Validation` (or `Forbidden` for policy
    /// violations detectable without I/O).
    fn validate(&self, params: &SourceParams) -> SourceResult<()>;

    /// Fetch documents for a job
    ///
    /// Returns a complete document list or an error - adapters never
    /// partially commit.
    ///
    /// # Errors
    ///
    /// Returns classified fetch errors per the taxonomy.
    async fn fetch(
        &self,
        ctx: &FetchContext,
        params: &SourceParams,
    ) -> SourceResult<Vec<RawDocument>>;

    /// Whether the adapter's backing services are reachable
    async fn health_check(&self) -> bool;

    /// Informational list of formats this adapter can produce
    fn supported_formats(&self) -> &[&'static str];
}

/// Adapter lookup by source tag
#[derive(Default)]
pub struct SourceRegistry {
    adapters: HashMap<&'static str, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own source tag
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source(), adapter);
    }

    /// Look up the adapter for a source tag
    ///
    /// # Errors
    ///
    /// Returns a validation error for unregistered tags.
    pub fn get(&self, source: &str) -> SourceResult<Arc<dyn SourceAdapter>> {
        self.adapters
            .get(source)
            .cloned()
            .ok_or_else(|| SourceError::Validation(format!("no adapter registered for {source}")))
    }

    /// Registered source tags
    pub fn sources(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }
}

/// Seed metadata every adapter attaches: the source tag and fetch time
pub fn base_metadata(source: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), source.into());
    metadata.insert("fetched_at".to_string(), Utc::now().to_rfc3339().into());
    metadata
}

/// Short deterministic digest used for synthetic document ids
pub fn content_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Enforce `document_id` uniqueness within one fetch result
///
/// Colliding ids get a deterministic content-derived suffix; a further
/// collision (identical content) falls back to the list position, which is
/// stable for a given fetch result.
pub fn ensure_unique_document_ids(documents: &mut [RawDocument]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for index in 0..documents.len() {
        let Some(doc) = documents.get(index) else {
            continue;
        };
        let id = doc.document_id.clone();
        match seen.get(&id) {
            None => {
                seen.insert(id, index);
            }
            Some(_) => {
                let digest = content_digest(&doc.content);
                let mut candidate = format!("{id}-{digest}");
                if seen.contains_key(&candidate) {
                    candidate = format!("{id}-{digest}-{index}");
                }
                tracing::debug!(
                    original = %id,
                    renamed = %candidate,
                    "duplicate document id within one fetch; applying deterministic suffix"
                );
                if let Some(doc) = documents.get_mut(index) {
                    doc.document_id = candidate.clone();
                }
                seen.insert(candidate, index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> RawDocument {
        RawDocument::new(
            id.to_string(),
            content.to_string(),
            base_metadata("file_upload"),
            "tenant-a".to_string(),
        )
    }

    #[test]
    fn base_metadata_carries_source_and_fetch_time() {
        let metadata = base_metadata("url_scrape");
        assert_eq!(metadata.get("source").and_then(|v| v.as_str()), Some("url_scrape"));
        assert!(metadata.contains_key("fetched_at"));
    }

    #[test]
    fn unique_ids_pass_through_unchanged() {
        let mut docs = vec![doc("a", "x"), doc("b", "y")];
        ensure_unique_document_ids(&mut docs);
        assert_eq!(docs[0].document_id, "a");
        assert_eq!(docs[1].document_id, "b");
    }

    #[test]
    fn collisions_get_deterministic_suffixes() {
        let mut docs = vec![doc("a", "first"), doc("a", "second"), doc("a", "third")];
        ensure_unique_document_ids(&mut docs);

        let ids: Vec<&str> = docs.iter().map(|d| d.document_id.as_str()).collect();
        assert_eq!(ids[0], "a");
        assert_ne!(ids[1], "a");
        assert_ne!(ids[2], "a");
        assert_ne!(ids[1], ids[2]);

        // Deterministic: the same input renames the same way
        let mut again = vec![doc("a", "first"), doc("a", "second"), doc("a", "third")];
        ensure_unique_document_ids(&mut again);
        let ids_again: Vec<&str> = again.iter().map(|d| d.document_id.as_str()).collect();
        assert_eq!(ids, ids_again);
    }

    #[test]
    fn identical_content_collisions_still_diverge() {
        let mut docs = vec![doc("a", "same"), doc("a", "same")];
        ensure_unique_document_ids(&mut docs);
        assert_ne!(docs[0].document_id, docs[1].document_id);
    }
}
