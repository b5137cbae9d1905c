//! URL scrape adapter
//!
//! Fetches one page or a whole sitemap's worth of pages, honoring
//! robots.txt for the configured User-Agent, spacing all requests to one
//! hostname through the rate limiter, and extracting the main content of
//! each page with a fixed selector priority.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use scraper::{Html, Selector};
use url::Url;

use docflow_common::{RateLimiter, RetryPolicy};
use docflow_config::UrlScrapeConfig;
use docflow_processing::{RawDocument, element_text, element_text_excluding};

use crate::adapter::{FetchContext, SourceAdapter, base_metadata, content_digest, ensure_unique_document_ids};
use crate::error::{SourceError, SourceResult};
use crate::params::{SourceParams, UrlScrapeParams};
use crate::robots::RobotsTxt;
use crate::sitemap::{SitemapDocument, parse_sitemap};

/// Ceiling on sitemap documents fetched while resolving an index tree
const MAX_SITEMAP_FETCHES: usize = 50;

/// Page chrome stripped in the body-fallback extraction path
const CHROME_ELEMENTS: &[&str] = &["nav", "header", "footer", "aside"];

/// Meta names lifted into flat metadata keys
const META_NAMES: &[&str] = &["description", "author", "keywords", "published"];

/// Source adapter for `url_scrape` jobs
pub struct UrlScrapeAdapter {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    config: UrlScrapeConfig,
    robots_cache: DashMap<String, Arc<RobotsTxt>>,
}

impl UrlScrapeAdapter {
    /// Build the adapter and its shared HTTP client
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be constructed.
    pub fn new(config: UrlScrapeConfig, retry: RetryPolicy) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SourceError::Internal(format!("failed to build HTTP client: {e}")))?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Ok(Self {
            client,
            limiter,
            retry,
            config,
            robots_cache: DashMap::new(),
        })
    }

    fn expect_params<'a>(params: &'a SourceParams) -> SourceResult<&'a UrlScrapeParams> {
        match params {
            SourceParams::UrlScrape(p) => Ok(p),
            other => Err(SourceError::Validation(format!(
                "url_scrape adapter received {} parameters",
                other.source()
            ))),
        }
    }

    fn parse_target(raw: &str, field: &str) -> SourceResult<Url> {
        let url = Url::parse(raw)
            .map_err(|e| SourceError::Validation(format!("invalid {field}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::Validation(format!(
                "invalid {field}: unsupported scheme {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(SourceError::Validation(format!("invalid {field}: missing host")));
        }
        Ok(url)
    }

    fn rate_key(url: &Url) -> String {
        url.host_str().unwrap_or("unknown").to_string()
    }

    fn path_and_query(url: &Url) -> String {
        match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        }
    }

    /// Fetch and cache the robots.txt rules for a URL's host
    ///
    /// A missing or unfetchable robots.txt means allow-all.
    async fn robots_for(&self, ctx: &FetchContext, url: &Url) -> SourceResult<Arc<RobotsTxt>> {
        let host = Self::rate_key(url);
        if let Some(cached) = self.robots_cache.get(&host) {
            return Ok(Arc::clone(&cached));
        }

        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        self.limiter
            .acquire_cancellable(&host, &ctx.cancel)
            .await?;

        let robots = match self.client.get(robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => RobotsTxt::parse(&body),
                Err(_) => RobotsTxt::allow_all(),
            },
            Ok(_) | Err(_) => {
                tracing::debug!(host = %host, "robots.txt unavailable; treating as allow-all");
                RobotsTxt::allow_all()
            }
        };

        let robots = Arc::new(robots);
        self.robots_cache.insert(host, Arc::clone(&robots));
        Ok(robots)
    }

    /// Fetch a raw body (sitemaps), rate-limited and retried, size-capped
    async fn fetch_text(&self, ctx: &FetchContext, url: &Url) -> SourceResult<String> {
        let key = Self::rate_key(url);
        let key = key.as_str();
        self.retry
            .run(&ctx.cancel, || async move {
                self.limiter.acquire_cancellable(key, &ctx.cancel).await?;
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, url.as_str()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::from_status(status.as_u16(), url.as_str()));
                }
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, url.as_str()))?;
                if body.len() as u64 > self.config.max_body_bytes {
                    return Err(SourceError::SizeExceeded(format!(
                        "{url}: {} bytes exceeds cap {}",
                        body.len(),
                        self.config.max_body_bytes
                    )));
                }
                String::from_utf8(body.to_vec())
                    .map_err(|e| SourceError::Internal(format!("{url}: invalid UTF-8: {e}")))
            })
            .await
    }

    /// Fetch one page and extract its content and metadata
    async fn fetch_page(&self, ctx: &FetchContext, url: &Url) -> SourceResult<RawDocument> {
        let key = Self::rate_key(url);
        let key = key.as_str();
        let body = self
            .retry
            .run(&ctx.cancel, || async move {
                self.limiter.acquire_cancellable(key, &ctx.cancel).await?;
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, url.as_str()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::from_status(status.as_u16(), url.as_str()));
                }

                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                if !content_type.contains("html") {
                    return Err(SourceError::Validation(format!(
                        "{url}: unsupported content type {content_type:?}"
                    )));
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, url.as_str()))?;
                if body.len() as u64 > self.config.max_body_bytes {
                    return Err(SourceError::SizeExceeded(format!(
                        "{url}: {} bytes exceeds cap {}",
                        body.len(),
                        self.config.max_body_bytes
                    )));
                }
                Ok(String::from_utf8_lossy(&body).into_owned())
            })
            .await?;

        let (content, page_metadata) = extract_page(&body);

        let mut metadata = base_metadata("url_scrape");
        metadata.insert("url".to_string(), url.as_str().into());
        metadata.insert("content_type".to_string(), "text/html".into());
        for (key, value) in page_metadata {
            metadata.insert(key, value.into());
        }

        Ok(RawDocument::new(
            format!("web-{}", content_digest(url.as_str())),
            content,
            metadata,
            ctx.tenant_id.clone(),
        ))
    }

    /// Resolve a sitemap (or index tree) into page URLs, deduplicated and
    /// capped at `max_pages` globally
    async fn resolve_sitemap(
        &self,
        ctx: &FetchContext,
        root: Url,
        max_pages: usize,
    ) -> SourceResult<Vec<Url>> {
        let mut queue: VecDeque<Url> = VecDeque::from([root]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_pages: HashSet<String> = HashSet::new();
        let mut pages: Vec<Url> = Vec::new();
        let mut fetches = 0usize;

        while let Some(sitemap_url) = queue.pop_front() {
            if pages.len() >= max_pages {
                break;
            }
            if !visited.insert(sitemap_url.as_str().to_string()) {
                continue;
            }
            if fetches >= MAX_SITEMAP_FETCHES {
                tracing::warn!(
                    cap = MAX_SITEMAP_FETCHES,
                    "sitemap fetch cap reached; ignoring remaining children"
                );
                break;
            }
            fetches += 1;

            let body = self.fetch_text(ctx, &sitemap_url).await?;
            match parse_sitemap(&body)? {
                SitemapDocument::Index(children) => {
                    for child in children {
                        match Url::parse(&child) {
                            Ok(url) => queue.push_back(url),
                            Err(e) => {
                                tracing::debug!(child = %child, %e, "skipping bad child sitemap URL");
                            }
                        }
                    }
                }
                SitemapDocument::UrlSet(urls) => {
                    for raw in urls {
                        if pages.len() >= max_pages {
                            break;
                        }
                        match Url::parse(&raw) {
                            Ok(url) => {
                                if seen_pages.insert(url.as_str().to_string()) {
                                    pages.push(url);
                                }
                            }
                            Err(e) => {
                                tracing::debug!(url = %raw, %e, "skipping bad page URL in sitemap");
                            }
                        }
                    }
                }
            }
        }

        Ok(pages)
    }
}

#[async_trait]
impl SourceAdapter for UrlScrapeAdapter {
    fn source(&self) -> &'static str {
        "url_scrape"
    }

    fn validate(&self, params: &SourceParams) -> SourceResult<()> {
        let p = Self::expect_params(params)?;
        match (&p.url, &p.sitemap_url) {
            (Some(_), Some(_)) => {
                return Err(SourceError::Validation(
                    "provide exactly one of url or sitemap_url, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(SourceError::Validation(
                    "one of url or sitemap_url is required".to_string(),
                ));
            }
            _ => {}
        }
        if let Some(url) = &p.url {
            Self::parse_target(url, "url")?;
        }
        if let Some(sitemap_url) = &p.sitemap_url {
            Self::parse_target(sitemap_url, "sitemap_url")?;
            if !(1..=100).contains(&p.max_pages) {
                return Err(SourceError::Validation(format!(
                    "max_pages must be within 1..=100, got {}",
                    p.max_pages
                )));
            }
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

        let targets: Vec<Url> = if let Some(raw) = &p.url {
            let url = Self::parse_target(raw, "url")?;
            if self.config.respect_robots {
                let robots = self.robots_for(ctx, &url).await?;
                if !robots.is_allowed(&self.config.user_agent, &Self::path_and_query(&url)) {
                    return Err(SourceError::Forbidden(format!(
                        "{url} is disallowed by robots.txt for {}",
                        self.config.user_agent
                    )));
                }
            }
            vec![url]
        } else if let Some(raw) = &p.sitemap_url {
            let sitemap_url = Self::parse_target(raw, "sitemap_url")?;
            let candidates = self
                .resolve_sitemap(ctx, sitemap_url, p.max_pages as usize)
                .await?;
            if self.config.respect_robots {
                let mut allowed = Vec::with_capacity(candidates.len());
                for url in candidates {
                    let robots = self.robots_for(ctx, &url).await?;
                    if robots.is_allowed(&self.config.user_agent, &Self::path_and_query(&url)) {
                        allowed.push(url);
                    } else {
                        tracing::info!(url = %url, "skipping robots-disallowed URL from sitemap");
                    }
                }
                allowed
            } else {
                candidates
            }
        } else {
            // validate() made this unreachable
            Vec::new()
        };

        let mut documents = Vec::with_capacity(targets.len());
        for url in &targets {
            if ctx.cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            documents.push(self.fetch_page(ctx, url).await?);
        }

        ensure_unique_document_ids(&mut documents);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            pages = documents.len(),
            "url scrape fetch complete"
        );
        Ok(documents)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["text/html"]
    }
}

fn selector(input: &str) -> Option<Selector> {
    Selector::parse(input).ok()
}

/// Extract main content and flat metadata from one HTML page.
/// Runs synchronously so the non-Send scraper DOM never crosses an await.
fn extract_page(body: &str) -> (String, Vec<(String, String)>) {
    let document = Html::parse_document(body);

    let mut content = String::new();
    let priorities = [
        "article",
        "main",
        r#"[role="main"]"#,
        ".content, .main-content, .post-content, .article-body",
    ];
    for sel_str in priorities {
        if let Some(sel) = selector(sel_str) {
            if let Some(element) = document.select(&sel).next() {
                element_text(&element, &mut content);
                if !content.trim().is_empty() {
                    break;
                }
                content.clear();
            }
        }
    }
    if content.trim().is_empty() {
        if let Some(sel) = selector("body") {
            if let Some(body_el) = document.select(&sel).next() {
                content.clear();
                element_text_excluding(&body_el, CHROME_ELEMENTS, &mut content);
            }
        }
    }

    let mut metadata: Vec<(String, String)> = Vec::new();
    if let Some(sel) = selector("title") {
        if let Some(title) = document.select(&sel).next() {
            let text: String = title.text().collect();
            let text = text.trim();
            if !text.is_empty() {
                metadata.push(("title".to_string(), text.to_string()));
            }
        }
    }
    if let Some(sel) = selector("meta") {
        for meta in document.select(&sel) {
            let Some(value) = meta.value().attr("content") else {
                continue;
            };
            let key = meta
                .value()
                .attr("name")
                .or_else(|| meta.value().attr("property"));
            let Some(key) = key else { continue };

            let keep = META_NAMES.contains(&key)
                || key.starts_with("og:")
                || key.starts_with("twitter:");
            if keep && !value.trim().is_empty() {
                metadata.push((key.to_string(), value.trim().to_string()));
            }
        }
    }

    (content, metadata)
}
