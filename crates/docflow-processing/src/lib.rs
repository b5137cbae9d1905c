//! Text processing for the ingestion pipeline
//!
//! Owns the in-memory document model and the CLEAN and CHUNK stages:
//! normalization, HTML stripping, and token-accurate segmentation with
//! optional embedding-guided semantic boundaries.

pub mod chunking;
pub mod clean;
pub mod document;
pub mod error;
pub mod html;

pub use chunking::{ChunkPiece, Chunker, TiktokenCounter, TokenCounter};
pub use clean::CleanStage;
pub use document::{Chunk, CleanedDocument, Metadata, RawDocument};
pub use error::{ProcessingError, ProcessingResult};
pub use html::{element_text, element_text_excluding, html_to_text, looks_like_html};
