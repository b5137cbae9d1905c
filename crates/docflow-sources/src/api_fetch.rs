//! External HTTP API adapter
//!
//! Pulls item arrays out of JSON or XML endpoints, with an authentication
//! descriptor, dotted-path navigation, and three pagination strategies
//! (RFC 5988 `Link` headers, dotted JSON path, offset increment). Each
//! item becomes one document; fields not used as content become metadata.

use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use url::Url;

use docflow_common::{RateLimiter, RetryPolicy};
use docflow_config::ApiFetchConfig;
use docflow_processing::RawDocument;

use crate::adapter::{FetchContext, SourceAdapter, base_metadata, content_digest, ensure_unique_document_ids};
use crate::error::{SourceError, SourceResult};
use crate::params::{ApiFetchParams, AuthKind, PaginationKind, ResponseFormat, SourceParams};

/// Item keys probed for a natural document id, in order
const ID_FIELDS: &[&str] = &["id", "_id", "uuid", "key"];

/// Source adapter for `api_fetch` jobs
pub struct ApiFetchAdapter {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl ApiFetchAdapter {
    /// Build the adapter and its shared HTTP client
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be constructed.
    pub fn new(config: &ApiFetchConfig, retry: RetryPolicy) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| SourceError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            retry,
        })
    }

    fn expect_params<'a>(params: &'a SourceParams) -> SourceResult<&'a ApiFetchParams> {
        match params {
            SourceParams::ApiFetch(p) => Ok(p),
            other => Err(SourceError::Validation(format!(
                "api_fetch adapter received {} parameters",
                other.source()
            ))),
        }
    }

    /// Execute one page request; returns the body and any `Link` header
    async fn execute(
        &self,
        ctx: &FetchContext,
        p: &ApiFetchParams,
        url: &Url,
        apply_query: bool,
        offset: Option<u64>,
    ) -> SourceResult<(String, Option<String>)> {
        let key = url.host_str().unwrap_or("unknown").to_string();
        let key = key.as_str();
        self.retry
            .run(&ctx.cancel, || async move {
                self.limiter.acquire_cancellable(key, &ctx.cancel).await?;

                let mut request_url = url.clone();
                if apply_query {
                    if let Some(query_params) = &p.query_params {
                        let mut pairs = request_url.query_pairs_mut();
                        for (name, value) in query_params {
                            pairs.append_pair(name, value);
                        }
                    }
                }
                if let Some(offset) = offset {
                    request_url
                        .query_pairs_mut()
                        .append_pair(&p.offset_param, &offset.to_string());
                }

                let mut request = match p.method.to_ascii_uppercase().as_str() {
                    "GET" => self.client.get(request_url.clone()),
                    "POST" => self.client.post(request_url.clone()),
                    other => {
                        return Err(SourceError::Validation(format!(
                            "unsupported method: {other}"
                        )));
                    }
                };

                request = match p.auth_type {
                    AuthKind::None => request,
                    AuthKind::ApiKey => {
                        let api_key = p.api_key.as_deref().ok_or_else(|| {
                            SourceError::Validation("api_key auth requires api_key".to_string())
                        })?;
                        request.header(p.api_key_header.as_str(), api_key)
                    }
                    AuthKind::Bearer => {
                        let token = p.bearer_token.as_deref().ok_or_else(|| {
                            SourceError::Validation("bearer auth requires bearer_token".to_string())
                        })?;
                        request.bearer_auth(token)
                    }
                    AuthKind::Basic => {
                        let username = p.username.as_deref().ok_or_else(|| {
                            SourceError::Validation("basic auth requires username".to_string())
                        })?;
                        request.basic_auth(username, p.password.as_deref())
                    }
                    AuthKind::CustomHeaders => {
                        let headers = p.custom_headers.as_ref().ok_or_else(|| {
                            SourceError::Validation(
                                "custom_headers auth requires custom_headers".to_string(),
                            )
                        })?;
                        let mut request = request;
                        for (name, value) in headers {
                            request = request.header(name.as_str(), value.as_str());
                        }
                        request
                    }
                };

                if let Some(body) = &p.body {
                    request = request.json(body);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, request_url.as_str()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::from_status(status.as_u16(), request_url.as_str()));
                }

                let link_header = response
                    .headers()
                    .get(reqwest::header::LINK)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = response
                    .text()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, request_url.as_str()))?;
                Ok((body, link_header))
            })
            .await
    }

    fn item_to_document(
        &self,
        ctx: &FetchContext,
        p: &ApiFetchParams,
        item: &serde_json::Value,
        page_number: u32,
    ) -> SourceResult<RawDocument> {
        let mut metadata = base_metadata("api_fetch");
        metadata.insert("api_url".to_string(), p.api_url.clone().into());
        metadata.insert("page_number".to_string(), page_number.into());

        let (content, document_id) = if let serde_json::Value::Object(fields) = item {
            // Content: the configured field when present, else the
            // canonical JSON serialization of the whole item
            let content = p
                .content_field
                .as_deref()
                .and_then(|field| fields.get(field))
                .map(value_to_text)
                .unwrap_or_else(|| canonical_json(item));

            if let Some(title_field) = p.title_field.as_deref() {
                if let Some(title) = fields.get(title_field) {
                    metadata.insert("title".to_string(), value_to_text(title).into());
                }
            }
            for (name, value) in fields {
                if Some(name.as_str()) == p.content_field.as_deref() {
                    continue;
                }
                metadata.entry(name.clone()).or_insert_with(|| value.clone());
            }

            let document_id = ID_FIELDS
                .iter()
                .find_map(|field| fields.get(*field))
                .map_or_else(
                    || format!("api-{}", content_digest(&canonical_json(item))),
                    value_to_text,
                );
            (content, document_id)
        } else {
            let content = value_to_text(item);
            let document_id = format!("api-{}", content_digest(&content));
            (content, document_id)
        };

        Ok(RawDocument::new(
            document_id,
            content,
            metadata,
            ctx.tenant_id.clone(),
        ))
    }
}

#[async_trait]
impl SourceAdapter for ApiFetchAdapter {
    fn source(&self) -> &'static str {
        "api_fetch"
    }

    fn validate(&self, params: &SourceParams) -> SourceResult<()> {
        let p = Self::expect_params(params)?;

        let url = Url::parse(&p.api_url)
            .map_err(|e| SourceError::Validation(format!("invalid api_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::Validation(format!(
                "invalid api_url: unsupported scheme {}",
                url.scheme()
            )));
        }
        if !matches!(p.method.to_ascii_uppercase().as_str(), "GET" | "POST") {
            return Err(SourceError::Validation(format!(
                "unsupported method: {}",
                p.method
            )));
        }
        match p.auth_type {
            AuthKind::ApiKey if p.api_key.is_none() => {
                return Err(SourceError::Validation(
                    "api_key auth requires api_key".to_string(),
                ));
            }
            AuthKind::Bearer if p.bearer_token.is_none() => {
                return Err(SourceError::Validation(
                    "bearer auth requires bearer_token".to_string(),
                ));
            }
            AuthKind::Basic if p.username.is_none() => {
                return Err(SourceError::Validation(
                    "basic auth requires username".to_string(),
                ));
            }
            AuthKind::CustomHeaders if p.custom_headers.is_none() => {
                return Err(SourceError::Validation(
                    "custom_headers auth requires custom_headers".to_string(),
                ));
            }
            _ => {}
        }
        if p.response_format == ResponseFormat::Xml && p.xml_item_tag.is_none() {
            return Err(SourceError::Validation(
                "xml responses require xml_item_tag".to_string(),
            ));
        }
        if p.pagination == PaginationKind::JsonPath && p.next_url_path.is_none() {
            return Err(SourceError::Validation(
                "json_path pagination requires next_url_path".to_string(),
            ));
        }
        if !(1..=100).contains(&p.max_pages) {
            return Err(SourceError::Validation(format!(
                "max_pages must be within 1..=100, got {}",
                p.max_pages
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

        let base_url = Url::parse(&p.api_url)
            .map_err(|e| SourceError::Validation(format!("invalid api_url: {e}")))?;

        let mut documents = Vec::new();
        let mut page_url = base_url.clone();
        let mut page_number: u32 = 1;
        let mut offset: u64 = 0;
        // query_params belong to the first request; link/json-path next
        // URLs carry their own query strings
        let mut apply_query = true;

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }

            let page_offset =
                (p.pagination == PaginationKind::Offset && page_number > 1).then_some(offset);
            let (body, link_header) = self
                .execute(ctx, p, &page_url, apply_query, page_offset)
                .await?;

            let (items, next_from_body) = match p.response_format {
                ResponseFormat::Json => {
                    let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
                        SourceError::Internal(format!("{page_url}: invalid JSON: {e}"))
                    })?;
                    let target = match p.data_path.as_deref() {
                        Some(path) if !path.is_empty() => {
                            navigate_path(&value, path).ok_or_else(|| {
                                SourceError::Validation(format!(
                                    "data_path {path:?} not found in response"
                                ))
                            })?
                        }
                        _ => &value,
                    };
                    let items = target
                        .as_array()
                        .ok_or_else(|| {
                            SourceError::Validation(format!(
                                "data_path {:?} does not point at an array",
                                p.data_path.as_deref().unwrap_or("<root>")
                            ))
                        })?
                        .clone();
                    let next = p
                        .next_url_path
                        .as_deref()
                        .and_then(|path| navigate_path(&value, path))
                        .and_then(|v| v.as_str().map(str::to_string));
                    (items, next)
                }
                ResponseFormat::Xml => {
                    let tag = p.xml_item_tag.as_deref().unwrap_or("item");
                    let maps = xml_items(&body, tag)?;
                    (
                        maps.into_iter().map(serde_json::Value::Object).collect(),
                        None,
                    )
                }
            };

            let item_count = items.len();
            for item in &items {
                documents.push(self.item_to_document(ctx, p, item, page_number)?);
            }

            if item_count == 0 || page_number >= p.max_pages {
                break;
            }

            let next_url = match p.pagination {
                PaginationKind::None => None,
                PaginationKind::LinkHeader => link_header
                    .as_deref()
                    .and_then(parse_next_link)
                    .and_then(|next| page_url.join(&next).ok()),
                PaginationKind::JsonPath => {
                    next_from_body.and_then(|next| page_url.join(&next).ok())
                }
                PaginationKind::Offset => {
                    offset += item_count as u64;
                    Some(base_url.clone())
                }
            };

            let Some(next_url) = next_url else { break };
            // Loop protection for servers echoing the current page
            if p.pagination != PaginationKind::Offset && next_url == page_url {
                break;
            }
            apply_query = p.pagination == PaginationKind::Offset;
            page_url = next_url;
            page_number += 1;
        }

        ensure_unique_document_ids(&mut documents);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            items = documents.len(),
            pages = page_number,
            "api fetch complete"
        );
        Ok(documents)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["application/json", "application/xml"]
    }
}

/// Render a JSON value as document text
fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Canonical JSON serialization used for content fallbacks and hashing
fn canonical_json(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Walk a dotted path (`data.items`) through a JSON value
fn navigate_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .try_fold(value, |acc, key| if key.is_empty() { Some(acc) } else { acc.get(key) })
}

/// Extract the `rel="next"` target from an RFC 5988 `Link` header
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut sections = part.split(';');
        let url = sections
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?
            .to_string();
        sections
            .any(|section| {
                let section = section.trim();
                section == "rel=\"next\"" || section == "rel=next"
            })
            .then_some(url)
    })
}

/// Collect flat maps from elements matching `item_tag` in an XML body
fn xml_items(
    xml: &str,
    item_tag: &str,
) -> SourceResult<Vec<serde_json::Map<String, serde_json::Value>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let wanted = item_tag.as_bytes().to_ascii_lowercase();
    let mut items = Vec::new();
    let mut current: Option<serde_json::Map<String, serde_json::Value>> = None;
    let mut child: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = element
                    .name()
                    .as_ref()
                    .rsplit(|&b| b == b':')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if name == wanted && current.is_none() {
                    current = Some(serde_json::Map::new());
                } else if current.is_some() {
                    child = Some(String::from_utf8_lossy(&name).into_owned());
                }
            }
            Ok(Event::End(element)) => {
                let name = element
                    .name()
                    .as_ref()
                    .rsplit(|&b| b == b':')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if name == wanted {
                    if let Some(map) = current.take() {
                        items.push(map);
                    }
                    child = None;
                } else if child.as_deref().map(str::as_bytes) == Some(name.as_slice()) {
                    child = None;
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(map), Some(field)) = (current.as_mut(), child.as_deref()) {
                    let value = text
                        .unescape()
                        .map_err(|e| SourceError::Internal(format!("bad XML text: {e}")))?;
                    let entry = map
                        .entry(field.to_string())
                        .or_insert_with(|| serde_json::Value::String(String::new()));
                    if let serde_json::Value::String(existing) = entry {
                        existing.push_str(&value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SourceError::Internal(format!("XML parse error: {e}"))),
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_common::CorrelationId;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter() -> ApiFetchAdapter {
        ApiFetchAdapter::new(
            &ApiFetchConfig {
                request_timeout: Duration::from_secs(5),
                verify_ssl: true,
                rate_limit: Duration::ZERO,
            },
            RetryPolicy::no_retry(),
        )
        .unwrap()
    }

    fn ctx() -> FetchContext {
        FetchContext::new("tenant-a", CorrelationId::new(), CancellationToken::new())
    }

    fn base_params(api_url: String) -> ApiFetchParams {
        match SourceParams::parse("api_fetch", &serde_json::json!({"api_url": api_url})).unwrap() {
            SourceParams::ApiFetch(p) => p,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn navigates_data_path_and_maps_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/articles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"items": [
                    {"id": 7, "headline": "First", "text": "Body of the first article", "author": "sam"},
                    {"id": 8, "headline": "Second", "text": "Body of the second article", "author": "kim"},
                ]},
            })))
            .mount(&server)
            .await;

        let mut p = base_params(format!("{}/v1/articles", server.uri()));
        p.data_path = Some("data.items".to_string());
        p.content_field = Some("text".to_string());
        p.title_field = Some("headline".to_string());

        let docs = adapter()
            .fetch(&ctx(), &SourceParams::ApiFetch(p))
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "Body of the first article");
        assert_eq!(docs[0].document_id, "7");
        assert_eq!(docs[0].metadata.get("title").and_then(|v| v.as_str()), Some("First"));
        assert_eq!(docs[0].metadata.get("author").and_then(|v| v.as_str()), Some("sam"));
        assert_eq!(docs[0].metadata.get("page_number").and_then(serde_json::Value::as_u64), Some(1));
        // Content field itself is not duplicated into metadata
        assert!(!docs[0].metadata.contains_key("text"));
    }

    #[tokio::test]
    async fn link_header_pagination_stops_at_the_last_page() {
        let server = MockServer::start().await;
        // The specific page=2 mock mounts first so it wins the match
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "2"))
            .respond_with(
                // No rel="next": pagination terminates exactly here
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"id": 2, "note": "page two item"}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "Link",
                        format!("<{}/items?page=2>; rel=\"next\"", server.uri()).as_str(),
                    )
                    .set_body_json(serde_json::json!([{"id": 1, "note": "page one item"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut p = base_params(format!("{}/items", server.uri()));
        p.pagination = PaginationKind::LinkHeader;
        p.max_pages = 10;

        let docs = adapter()
            .fetch(&ctx(), &SourceParams::ApiFetch(p))
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].metadata.get("page_number").and_then(serde_json::Value::as_u64), Some(2));
    }

    #[tokio::test]
    async fn offset_pagination_stops_on_an_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rows"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rows"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!([{"id": "a", "v": 1}, {"id": "b", "v": 2}]),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let mut p = base_params(format!("{}/rows", server.uri()));
        p.pagination = PaginationKind::Offset;
        p.max_pages = 10;

        let docs = adapter()
            .fetch(&ctx(), &SourceParams::ApiFetch(p))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn api_key_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-API-Key", "sekrit"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"id": 1, "body": "authorized item"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut p = base_params(format!("{}/secure", server.uri()));
        p.auth_type = AuthKind::ApiKey;
        p.api_key = Some("sekrit".to_string());

        let docs = adapter()
            .fetch(&ctx(), &SourceParams::ApiFetch(p))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn xml_items_become_documents() {
        let server = MockServer::start().await;
        let xml = r"<feed>
            <entry><title>One</title><summary>First summary text</summary></entry>
            <entry><title>Two</title><summary>Second summary text</summary></entry>
        </feed>";
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(xml, "application/xml"))
            .mount(&server)
            .await;

        let mut p = base_params(format!("{}/feed.xml", server.uri()));
        p.response_format = ResponseFormat::Xml;
        p.xml_item_tag = Some("entry".to_string());
        p.content_field = Some("summary".to_string());
        p.title_field = Some("title".to_string());

        let docs = adapter()
            .fetch(&ctx(), &SourceParams::ApiFetch(p))
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "First summary text");
        assert_eq!(docs[0].metadata.get("title").and_then(|v| v.as_str()), Some("One"));
    }

    #[tokio::test]
    async fn data_path_must_point_at_an_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"x": 1}})),
            )
            .mount(&server)
            .await;

        let mut p = base_params(format!("{}/bad", server.uri()));
        p.data_path = Some("data".to_string());

        let result = adapter().fetch(&ctx(), &SourceParams::ApiFetch(p)).await;
        assert!(matches!(result, Err(SourceError::Validation(_))));
    }

    #[test]
    fn link_header_parsing() {
        let header = r#"<https://api.test/items?page=3>; rel="next", <https://api.test/items?page=1>; rel="prev""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.test/items?page=3")
        );
        assert_eq!(parse_next_link(r#"<https://api.test/x>; rel="prev""#), None);
    }

    #[test]
    fn dotted_path_navigation() {
        let value = serde_json::json!({"a": {"b": {"c": [1, 2]}}});
        assert!(navigate_path(&value, "a.b.c").is_some_and(serde_json::Value::is_array));
        assert!(navigate_path(&value, "a.missing").is_none());
    }

    #[tokio::test]
    async fn missing_auth_material_fails_validation() {
        let mut p = base_params("https://api.example.test/v1".to_string());
        p.auth_type = AuthKind::Bearer;
        let result = adapter().validate(&SourceParams::ApiFetch(p));
        assert!(matches!(result, Err(SourceError::Validation(_))));
    }
}
