//! Typed source parameters
//!
//! Submissions carry an opaque `source_params` JSON blob; the pipeline
//! parses it into the variant matching the job's source tag before any
//! adapter runs. Parsing failures are validation errors raised before the
//! job record leaves `PENDING`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};

const fn default_count() -> u32 {
    1
}

const fn default_scrape_max_pages() -> u32 {
    10
}

const fn default_api_max_pages() -> u32 {
    10
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_limit_param() -> String {
    "limit".to_string()
}

/// `file_upload` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadParams {
    pub file_path: String,
}

/// `sec_edgar` parameters; exactly one of `ticker`/`cik` must be set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecEdgarParams {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub cik: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
    /// Number of recent filings to ingest (1..=10)
    #[serde(default = "default_count")]
    pub count: u32,
}

/// `url_scrape` parameters; exactly one of `url`/`sitemap_url` must be set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlScrapeParams {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sitemap_url: Option<String>,
    /// Global cap across all sitemaps (1..=100)
    #[serde(default = "default_scrape_max_pages")]
    pub max_pages: u32,
}

/// Authentication scheme for `api_fetch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    #[default]
    None,
    ApiKey,
    Bearer,
    Basic,
    CustomHeaders,
}

/// Response body format for `api_fetch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
}

/// Pagination strategy for `api_fetch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    #[default]
    None,
    LinkHeader,
    JsonPath,
    Offset,
}

/// `api_fetch` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiFetchParams {
    pub api_url: String,
    #[serde(default = "default_method")]
    pub method: String,

    // Authentication descriptor
    #[serde(default)]
    pub auth_type: AuthKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub custom_headers: Option<HashMap<String, String>>,

    // Request shape
    #[serde(default)]
    pub query_params: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    // Response interpretation
    #[serde(default)]
    pub response_format: ResponseFormat,
    /// Dotted path to the item array in a JSON response (e.g. `data.items`)
    #[serde(default)]
    pub data_path: Option<String>,
    /// Element name collected as items from an XML response
    #[serde(default)]
    pub xml_item_tag: Option<String>,
    #[serde(default)]
    pub content_field: Option<String>,
    #[serde(default)]
    pub title_field: Option<String>,

    // Pagination descriptor
    #[serde(default)]
    pub pagination: PaginationKind,
    /// Dotted path to the next-page URL for `json_path` pagination
    #[serde(default)]
    pub next_url_path: Option<String>,
    #[serde(default = "default_offset_param")]
    pub offset_param: String,
    #[serde(default = "default_limit_param")]
    pub limit_param: String,
    #[serde(default = "default_api_max_pages")]
    pub max_pages: u32,
}

/// `database_query` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseQueryParams {
    pub connection_string: String,
    pub query: String,
    /// Named parameters bound via the driver, never interpolated
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub content_column: Option<String>,
    #[serde(default)]
    pub title_column: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub max_rows: Option<u32>,
}

/// Parsed, typed source parameters - one variant per source tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceParams {
    FileUpload(FileUploadParams),
    SecEdgar(SecEdgarParams),
    UrlScrape(UrlScrapeParams),
    ApiFetch(ApiFetchParams),
    DatabaseQuery(DatabaseQueryParams),
}

impl SourceParams {
    /// Parse the opaque submission blob for the given source tag
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown source tags or parameter
    /// blobs that do not match the variant's shape.
    pub fn parse(source: &str, value: &serde_json::Value) -> SourceResult<Self> {
        let parsed = match source {
            "file_upload" => serde_json::from_value(value.clone()).map(Self::FileUpload),
            "sec_edgar" => serde_json::from_value(value.clone()).map(Self::SecEdgar),
            "url_scrape" => serde_json::from_value(value.clone()).map(Self::UrlScrape),
            "api_fetch" => serde_json::from_value(value.clone()).map(Self::ApiFetch),
            "database_query" => serde_json::from_value(value.clone()).map(Self::DatabaseQuery),
            other => {
                return Err(SourceError::Validation(format!("unknown source: {other}")));
            }
        };
        parsed.map_err(|e| SourceError::Validation(format!("invalid {source} parameters: {e}")))
    }

    /// The source tag this variant belongs to
    pub const fn source(&self) -> &'static str {
        match self {
            Self::FileUpload(_) => "file_upload",
            Self::SecEdgar(_) => "sec_edgar",
            Self::UrlScrape(_) => "url_scrape",
            Self::ApiFetch(_) => "api_fetch",
            Self::DatabaseQuery(_) => "database_query",
        }
    }
}
