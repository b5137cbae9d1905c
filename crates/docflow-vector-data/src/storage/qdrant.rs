//! Qdrant vector database backend
//!
//! Stores embedded chunks in one collection with the tenant identifier and
//! document metadata carried in the point payload. Point IDs are UUIDv5
//! digests of the chunk id, so re-ingesting the same document overwrites
//! its previous vectors instead of duplicating them.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CollectionExistsRequest, CreateCollection, Distance, PointStruct, UpsertPointsBuilder,
    VectorParams,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use docflow_common::CorrelationId;
use docflow_config::VectorStorageConfig;

use crate::error::{VectorDataError, VectorDataResult};
use crate::storage::traits::{VectorRecord, VectorStorage};

/// Vector store client backed by Qdrant
pub struct QdrantStorage {
    client: Qdrant,
    collection_name: String,
    dimensions: usize,
    upsert_batch_size: usize,
}

impl QdrantStorage {
    /// Connect to Qdrant and ensure the collection exists with the
    /// configured vector dimension
    ///
    /// # Errors
    ///
    /// Returns `VectorDataError::Config` if the client cannot be built and
    /// `VectorDataError::Storage` if the server is unreachable or
    /// collection creation fails.
    pub async fn new(config: &VectorStorageConfig) -> VectorDataResult<Self> {
        let mut builder = Qdrant::from_url(&config.base_url);
        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| VectorDataError::Config(format!("failed to create Qdrant client: {e}")))?;

        let storage = Self {
            client,
            collection_name: config.collection.clone(),
            dimensions: config.dimensions,
            upsert_batch_size: config.upsert_batch_size.max(1),
        };
        storage.ensure_collection().await?;
        Ok(storage)
    }

    /// Deterministic point id for a chunk
    fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }

    async fn collection_exists(&self) -> VectorDataResult<bool> {
        let request = CollectionExistsRequest {
            collection_name: self.collection_name.clone(),
        };
        self.client
            .collection_exists(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("failed to check collection: {e}")))
    }

    async fn ensure_collection(&self) -> VectorDataResult<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let request = CreateCollection {
            collection_name: self.collection_name.clone(),
            vectors_config: Some(
                VectorParams {
                    size: self.dimensions as u64,
                    distance: Distance::Cosine as i32,
                    ..Default::default()
                }
                .into(),
            ),
            ..Default::default()
        };

        match self.client.create_collection(request).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Race with another process creating the same collection
                if e.to_string().contains("already exists") {
                    Ok(())
                } else {
                    Err(VectorDataError::Storage(format!(
                        "failed to create collection: {e}"
                    )))
                }
            }
        }
    }

    fn record_to_point(&self, tenant_id: &str, record: &VectorRecord) -> VectorDataResult<PointStruct> {
        let mut payload_map = serde_json::Map::new();
        payload_map.insert("tenant_id".to_string(), tenant_id.into());
        payload_map.insert("chunk_id".to_string(), record.chunk_id.clone().into());
        payload_map.insert("content".to_string(), record.content.clone().into());
        for (key, value) in &record.metadata {
            payload_map.insert(key.clone(), value.clone());
        }

        let payload = Payload::try_from(serde_json::Value::Object(payload_map))
            .map_err(|e| VectorDataError::Storage(format!("invalid payload: {e}")))?;

        Ok(PointStruct::new(
            Self::point_id(&record.chunk_id),
            record.vector.clone(),
            payload,
        ))
    }
}

#[async_trait]
impl VectorStorage for QdrantStorage {
    #[tracing::instrument(skip(self, records), fields(collection = %self.collection_name, count = records.len()))]
    async fn upsert(
        &self,
        tenant_id: &str,
        records: &[VectorRecord],
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let points = records
            .iter()
            .map(|record| self.record_to_point(tenant_id, record))
            .collect::<VectorDataResult<Vec<_>>>()?;

        for (batch_index, batch) in points.chunks(self.upsert_batch_size).enumerate() {
            self.client
                .upsert_points(
                    UpsertPointsBuilder::new(&self.collection_name, batch.to_vec()).wait(true),
                )
                .await
                .map_err(|e| {
                    VectorDataError::Storage(format!(
                        "upsert failed at batch {batch_index} (correlation {correlation_id}): {e}"
                    ))
                })?;
        }

        tracing::debug!(
            correlation_id = %correlation_id,
            tenant_id,
            stored = records.len(),
            "upserted vector records"
        );
        Ok(records.len())
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}
