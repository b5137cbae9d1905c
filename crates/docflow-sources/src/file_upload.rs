//! File-upload adapter
//!
//! Validates an uploaded file's existence, size, and extension, then
//! delegates text extraction to a [`TextExtractor`]. Rich-format parsers
//! (PDF, DOCX) are external collaborators behind the same trait; the
//! built-in extractor handles plain text and markup.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use docflow_config::FileUploadConfig;
use docflow_processing::{Metadata, RawDocument};

use crate::adapter::{FetchContext, SourceAdapter, base_metadata, content_digest};
use crate::error::{SourceError, SourceResult};
use crate::params::{FileUploadParams, SourceParams};

/// Extracts text and metadata from file bytes by MIME type
pub trait TextExtractor: Send + Sync {
    /// Extract text and any format-specific metadata
    ///
    /// # Errors
    ///
    /// Returns a validation error for content the extractor cannot
    /// represent as text (e.g. binary data).
    fn extract(&self, bytes: &[u8], mime: &str) -> SourceResult<(String, Metadata)>;
}

/// Built-in extractor for plain text and markup formats
///
/// HTML passes through unstripped; the clean stage owns tag removal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], mime: &str) -> SourceResult<(String, Metadata)> {
        if bytes.contains(&0) {
            return Err(SourceError::Validation(
                "file appears to be binary (contains NUL bytes)".to_string(),
            ));
        }
        let text = String::from_utf8_lossy(bytes).into_owned();

        let mut metadata = Metadata::new();
        metadata.insert("content_type".to_string(), mime.into());
        Ok((text, metadata))
    }
}

/// Source adapter for `file_upload` jobs
pub struct FileUploadAdapter {
    extractor: Arc<dyn TextExtractor>,
    config: FileUploadConfig,
}

impl FileUploadAdapter {
    /// Adapter using the built-in plain-text extractor
    pub fn new(config: FileUploadConfig) -> Self {
        Self::with_extractor(config, Arc::new(PlainTextExtractor))
    }

    /// Adapter delegating to a custom extractor (PDF/DOCX services)
    pub fn with_extractor(config: FileUploadConfig, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor, config }
    }

    fn expect_params<'a>(params: &'a SourceParams) -> SourceResult<&'a FileUploadParams> {
        match params {
            SourceParams::FileUpload(p) => Ok(p),
            other => Err(SourceError::Validation(format!(
                "file_upload adapter received {} parameters",
                other.source()
            ))),
        }
    }

    fn extension_of(path: &Path) -> String {
        path.extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
    }
}

#[async_trait]
impl SourceAdapter for FileUploadAdapter {
    fn source(&self) -> &'static str {
        "file_upload"
    }

    fn validate(&self, params: &SourceParams) -> SourceResult<()> {
        let p = Self::expect_params(params)?;
        if p.file_path.trim().is_empty() {
            return Err(SourceError::Validation("file_path is required".to_string()));
        }

        let path = Path::new(&p.file_path);
        let extension = Self::extension_of(path);
        if !self.config.allowed_extensions.contains(&extension) {
            return Err(SourceError::Validation(format!(
                "unsupported file extension: {extension:?}"
            )));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|_| SourceError::NotFound(format!("file not found: {}", p.file_path)))?;
        if !metadata.is_file() {
            return Err(SourceError::Validation(format!(
                "not a regular file: {}",
                p.file_path
            )));
        }
        if metadata.len() > self.config.max_file_bytes {
            return Err(SourceError::SizeExceeded(format!(
                "{}: {} bytes exceeds cap {}",
                p.file_path,
                metadata.len(),
                self.config.max_file_bytes
            )));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx, params), fields(correlation_id = %ctx.correlation_id))]
    async fn fetch(
        &self,
        ctx: &FetchContext,
        params: &SourceParams,
    ) -> SourceResult<Vec<RawDocument>> {
        let p = Self::expect_params(params)?;
        self.validate(params)?;

        let path = Path::new(&p.file_path);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SourceError::NotFound(format!("failed to read {}: {e}", p.file_path)))?;
        if bytes.len() as u64 > self.config.max_file_bytes {
            return Err(SourceError::SizeExceeded(format!(
                "{}: {} bytes exceeds cap {}",
                p.file_path,
                bytes.len(),
                self.config.max_file_bytes
            )));
        }

        let mime = mime_guess::from_path(path)
            .first_or_text_plain()
            .essence_str()
            .to_string();
        let (text, extractor_metadata) = self.extractor.extract(&bytes, &mime)?;

        let mut metadata = base_metadata("file_upload");
        metadata.insert("source_path".to_string(), p.file_path.clone().into());
        if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
            metadata.insert("file_name".to_string(), file_name.into());
        }
        for (key, value) in extractor_metadata {
            metadata.entry(key).or_insert(value);
        }

        tracing::info!(
            correlation_id = %ctx.correlation_id,
            path = %p.file_path,
            bytes = bytes.len(),
            "file upload fetch complete"
        );
        Ok(vec![RawDocument::new(
            format!("file-{}", content_digest(&p.file_path)),
            text,
            metadata,
            ctx.tenant_id.clone(),
        )])
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["text/plain", "text/markdown", "text/html", "text/csv", "application/json"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_common::CorrelationId;
    use std::io::Write;
    use tokio_util::sync::CancellationToken;

    fn config() -> FileUploadConfig {
        FileUploadConfig {
            max_file_bytes: 1024,
            allowed_extensions: vec!["txt".to_string(), "md".to_string(), "html".to_string()],
        }
    }

    fn ctx() -> FetchContext {
        FetchContext::new("tenant-a", CorrelationId::new(), CancellationToken::new())
    }

    fn params_for(path: &Path) -> SourceParams {
        SourceParams::FileUpload(FileUploadParams {
            file_path: path.display().to_string(),
        })
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(contents).expect("write file");
        path
    }

    #[tokio::test]
    async fn reads_a_text_file_into_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.txt", b"Hello world. This is a very short document.");

        let adapter = FileUploadAdapter::new(config());
        let docs = adapter.fetch(&ctx(), &params_for(&path)).await.unwrap();

        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.content, "Hello world. This is a very short document.");
        assert_eq!(doc.content_bytes_len, 43);
        assert_eq!(doc.tenant_id, "tenant-a");
        assert_eq!(
            doc.metadata.get("file_name").and_then(|v| v.as_str()),
            Some("a.txt")
        );
        assert!(doc.metadata.get("source_path").is_some());
        assert_eq!(
            doc.metadata.get("content_type").and_then(|v| v.as_str()),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let adapter = FileUploadAdapter::new(config());
        let result = adapter
            .fetch(
                &ctx(),
                &SourceParams::FileUpload(FileUploadParams {
                    file_path: "/definitely/not/here.txt".to_string(),
                }),
            )
            .await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn disallowed_extension_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "binary.exe", b"MZ");

        let adapter = FileUploadAdapter::new(config());
        let result = adapter.validate(&params_for(&path));
        assert!(matches!(result, Err(SourceError::Validation(_))));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "big.txt", &vec![b'x'; 2048]);

        let adapter = FileUploadAdapter::new(config());
        let result = adapter.fetch(&ctx(), &params_for(&path)).await;
        assert!(matches!(result, Err(SourceError::SizeExceeded(_))));
    }

    #[tokio::test]
    async fn binary_content_is_rejected_by_the_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "fake.txt", b"text\0with\0nuls");

        let adapter = FileUploadAdapter::new(config());
        let result = adapter.fetch(&ctx(), &params_for(&path)).await;
        assert!(matches!(result, Err(SourceError::Validation(_))));
    }
}
