//! Source adapters for the ingestion pipeline
//!
//! Five adapters behind one capability set: uploaded files, SEC filings,
//! scraped web pages, external HTTP APIs, and SQL query results. Each
//! adapter validates its typed parameters before any I/O, spaces its
//! outbound requests through a per-key rate limiter, and returns either a
//! complete document list or a classified error.

pub mod adapter;
pub mod api_fetch;
pub mod database_query;
pub mod error;
pub mod file_upload;
pub mod params;
pub mod robots;
pub mod sec_edgar;
pub mod sitemap;
pub mod sql_guard;
pub mod url_scrape;

pub use adapter::{FetchContext, SourceAdapter, SourceRegistry, ensure_unique_document_ids};
pub use api_fetch::ApiFetchAdapter;
pub use database_query::DatabaseQueryAdapter;
pub use error::{SourceError, SourceResult};
pub use file_upload::{FileUploadAdapter, PlainTextExtractor, TextExtractor};
pub use params::{
    ApiFetchParams, AuthKind, DatabaseQueryParams, FileUploadParams, PaginationKind,
    ResponseFormat, SecEdgarParams, SourceParams, UrlScrapeParams,
};
pub use robots::RobotsTxt;
pub use sec_edgar::SecEdgarAdapter;
pub use sitemap::{SitemapDocument, parse_sitemap};
pub use url_scrape::UrlScrapeAdapter;
