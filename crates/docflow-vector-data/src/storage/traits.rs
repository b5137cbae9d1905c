//! Storage abstraction for the external vector database
//!
//! The pipeline consumes the downstream store through one operation:
//! tenant-scoped upsert of embedded chunk records. Search lives outside
//! this system entirely.

use async_trait::async_trait;

use docflow_common::CorrelationId;

use crate::error::VectorDataResult;

/// One embedded chunk ready for persistence
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Deterministic chunk identifier (`document_id` + ordinal)
    pub chunk_id: String,
    /// Embedding vector; dimension fixed by the provider model
    pub vector: Vec<f32>,
    /// Chunk text stored alongside the vector
    pub content: String,
    /// Flattened metadata inherited from the source document
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Trait for vector storage backends
///
/// The tenant dimension is passed explicitly on every call; the store
/// guarantees tenant isolation. Partial failures within a batch fail the
/// whole operation - the store's internal retry policy is opaque here.
#[async_trait]
pub trait VectorStorage: Send + Sync {
    /// Upsert records under the given tenant
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any batch fails; no partial success is
    /// reported.
    async fn upsert(
        &self,
        tenant_id: &str,
        records: &[VectorRecord],
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<usize>;

    /// Whether the backend is reachable
    async fn health_check(&self) -> bool;
}
