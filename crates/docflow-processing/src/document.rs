//! In-memory document artifacts flowing between pipeline stages
//!
//! These types live only within one orchestrator execution; nothing here
//! is persisted. Metadata accumulates as a document flows: adapters seed
//! it, the clean stage preserves it, and every chunk inherits its parent's
//! map untouched.

use serde::{Deserialize, Serialize};

/// Metadata map carried by documents and chunks
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A fetched payload as produced by a source adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// Adapter-assigned identifier, stable and unique within one fetch
    pub document_id: String,
    pub content: String,
    /// Size of the fetched payload before any processing
    pub content_bytes_len: usize,
    /// At minimum `source` and `fetched_at`, plus adapter-specific keys
    pub metadata: Metadata,
    pub tenant_id: String,
}

impl RawDocument {
    /// Construct with the byte length derived from the content
    pub fn new(document_id: String, content: String, metadata: Metadata, tenant_id: String) -> Self {
        let content_bytes_len = content.len();
        Self {
            document_id,
            content,
            content_bytes_len,
            metadata,
            tenant_id,
        }
    }
}

/// A document whose content has been normalized by the clean stage
///
/// Same shape as [`RawDocument`]; the distinction is the type-level
/// guarantee that content has passed normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedDocument {
    pub document_id: String,
    pub content: String,
    pub content_bytes_len: usize,
    pub metadata: Metadata,
    pub tenant_id: String,
}

/// A bounded-token segment of one cleaned document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic: `{document_id}:{position}`
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub token_count: usize,
    /// Zero-based ordinal within the parent document; dense per document
    pub position: usize,
    /// Inherited from the parent document
    pub metadata: Metadata,
}

impl Chunk {
    /// Deterministic chunk id for a document ordinal
    pub fn id_for(document_id: &str, position: usize) -> String {
        format!("{document_id}:{position}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_deterministic() {
        assert_eq!(Chunk::id_for("doc-1", 0), "doc-1:0");
        assert_eq!(Chunk::id_for("doc-1", 7), "doc-1:7");
    }

    #[test]
    fn raw_document_tracks_byte_length() {
        let doc = RawDocument::new(
            "doc-1".to_string(),
            "héllo".to_string(),
            Metadata::new(),
            "tenant-a".to_string(),
        );
        assert_eq!(doc.content_bytes_len, "héllo".len());
    }
}
