//! CLEAN stage: per-document text normalization
//!
//! Strips HTML when the content type indicates it, normalizes Unicode to
//! NFC, collapses whitespace runs to single spaces, and drops documents
//! that come out shorter than the configured minimum. Dropping is not a
//! failure - a job whose every document is dropped still completes.

use unicode_normalization::UnicodeNormalization;

use crate::document::{CleanedDocument, RawDocument};
use crate::html::{html_to_text, looks_like_html};

/// The CLEAN stage
#[derive(Debug, Clone)]
pub struct CleanStage {
    min_document_chars: usize,
}

impl CleanStage {
    /// Stage dropping cleaned documents shorter than `min_document_chars`
    pub const fn new(min_document_chars: usize) -> Self {
        Self { min_document_chars }
    }

    /// Clean a batch, dropping documents that normalize to nothing useful
    pub fn run(&self, documents: Vec<RawDocument>) -> Vec<CleanedDocument> {
        let input_count = documents.len();
        let cleaned: Vec<CleanedDocument> = documents
            .into_iter()
            .filter_map(|doc| self.clean_one(doc))
            .collect();

        if cleaned.len() < input_count {
            tracing::debug!(
                dropped = input_count - cleaned.len(),
                kept = cleaned.len(),
                "clean stage dropped short documents"
            );
        }
        cleaned
    }

    /// Clean one document; `None` means dropped
    pub fn clean_one(&self, doc: RawDocument) -> Option<CleanedDocument> {
        let is_html = doc
            .metadata
            .get("content_type")
            .and_then(|v| v.as_str())
            .is_some_and(|ct| ct.contains("html"))
            || looks_like_html(&doc.content);

        let text = if is_html {
            html_to_text(&doc.content)
        } else {
            doc.content
        };

        let normalized: String = text.nfc().collect();
        let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.chars().count() < self.min_document_chars {
            tracing::debug!(document_id = %doc.document_id, "dropping too-short document");
            return None;
        }

        Some(CleanedDocument {
            document_id: doc.document_id,
            content_bytes_len: collapsed.len(),
            content: collapsed,
            metadata: doc.metadata,
            tenant_id: doc.tenant_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn raw(content: &str) -> RawDocument {
        RawDocument::new(
            "doc-1".to_string(),
            content.to_string(),
            Metadata::new(),
            "tenant-a".to_string(),
        )
    }

    fn stage() -> CleanStage {
        CleanStage::new(10)
    }

    #[test]
    fn collapses_whitespace_and_trims() {
        let doc = stage()
            .clean_one(raw("  Hello\n\n  world,\tthis   is text.  "))
            .unwrap();
        assert_eq!(doc.content, "Hello world, this is text.");
    }

    #[test]
    fn strips_html_when_content_type_says_so() {
        let mut metadata = Metadata::new();
        metadata.insert("content_type".to_string(), "text/html".into());
        let doc = RawDocument::new(
            "doc-1".to_string(),
            "<p>Hello <em>there</em> world</p>".to_string(),
            metadata,
            "tenant-a".to_string(),
        );
        let cleaned = stage().clean_one(doc).unwrap();
        assert_eq!(cleaned.content, "Hello there world");
    }

    #[test]
    fn normalizes_to_nfc() {
        // "e" + combining acute accent normalizes to the composed form
        let doc = stage().clean_one(raw("cafe\u{0301} crowd gathered here")).unwrap();
        assert!(doc.content.starts_with("caf\u{e9}"));
    }

    #[test]
    fn drops_documents_below_minimum() {
        assert!(stage().clean_one(raw("tiny")).is_none());
        assert!(stage().clean_one(raw("   ")).is_none());
        assert!(stage().clean_one(raw("long enough to keep")).is_some());
    }

    #[test]
    fn metadata_and_identity_pass_through() {
        let mut metadata = Metadata::new();
        metadata.insert("url".to_string(), "https://example.test/a".into());
        let doc = RawDocument::new(
            "doc-9".to_string(),
            "an ordinary document body".to_string(),
            metadata,
            "tenant-b".to_string(),
        );
        let cleaned = stage().clean_one(doc).unwrap();
        assert_eq!(cleaned.document_id, "doc-9");
        assert_eq!(cleaned.tenant_id, "tenant-b");
        assert_eq!(
            cleaned.metadata.get("url").and_then(|v| v.as_str()),
            Some("https://example.test/a")
        );
    }

    #[test]
    fn batch_run_drops_only_short_documents() {
        let docs = vec![raw("this one survives the floor"), raw("no")];
        let cleaned = stage().run(docs);
        assert_eq!(cleaned.len(), 1);
    }
}
