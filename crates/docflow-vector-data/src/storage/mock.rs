//! In-memory vector storage for tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use docflow_common::CorrelationId;

use crate::error::{VectorDataError, VectorDataResult};
use crate::storage::traits::{VectorRecord, VectorStorage};

/// Records upserts per tenant; optionally fails to exercise store-stage
/// error paths
#[derive(Default)]
pub struct MockVectorStorage {
    records: Mutex<HashMap<String, Vec<VectorRecord>>>,
    fail_upserts: AtomicBool,
}

impl MockVectorStorage {
    /// Empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upsert fail
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Everything stored for a tenant, in upsert order
    pub fn records_for(&self, tenant_id: &str) -> Vec<VectorRecord> {
        self.records
            .lock()
            .map(|records| records.get(tenant_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Tenants that received at least one record
    pub fn tenants(&self) -> Vec<String> {
        self.records
            .lock()
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStorage for MockVectorStorage {
    async fn upsert(
        &self,
        tenant_id: &str,
        records: &[VectorRecord],
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<usize> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(VectorDataError::Storage(
                "simulated upsert failure".to_string(),
            ));
        }
        let mut stored = self
            .records
            .lock()
            .map_err(|e| VectorDataError::Storage(e.to_string()))?;
        stored
            .entry(tenant_id.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(records.len())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chunk_id: &str) -> VectorRecord {
        VectorRecord {
            chunk_id: chunk_id.to_string(),
            vector: vec![0.1, 0.2, 0.3],
            content: "text".to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn upserts_are_tenant_partitioned() {
        let storage = MockVectorStorage::new();
        let correlation_id = CorrelationId::new();

        storage
            .upsert("tenant-a", &[record("a:0"), record("a:1")], &correlation_id)
            .await
            .unwrap();
        storage
            .upsert("tenant-b", &[record("b:0")], &correlation_id)
            .await
            .unwrap();

        assert_eq!(storage.records_for("tenant-a").len(), 2);
        assert_eq!(storage.records_for("tenant-b").len(), 1);
        assert!(storage.records_for("tenant-c").is_empty());
    }

    #[tokio::test]
    async fn simulated_failure_surfaces() {
        let storage = MockVectorStorage::new();
        storage.fail_upserts(true);
        let result = storage
            .upsert("tenant-a", &[record("a:0")], &CorrelationId::new())
            .await;
        assert!(matches!(result, Err(VectorDataError::Storage(_))));
    }
}
