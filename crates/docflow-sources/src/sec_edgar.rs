//! SEC EDGAR filings adapter
//!
//! Resolves tickers to zero-padded CIKs through the published
//! `company_tickers.json` mapping, walks the company's submissions index,
//! and fetches the primary document of each matching filing. Every
//! outbound request goes through the `sec.gov` rate-limit key (100 ms
//! spacing by default, per SEC fair-access guidance) and the retry
//! executor, and must carry a User-Agent with contact information.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use docflow_common::{RateLimiter, RetryPolicy};
use docflow_config::SecEdgarConfig;
use docflow_processing::{RawDocument, html_to_text};

use crate::adapter::{FetchContext, SourceAdapter, base_metadata, ensure_unique_document_ids};
use crate::error::{SourceError, SourceResult};
use crate::params::{SecEdgarParams, SourceParams};

/// Rate-limit key shared by every SEC request
const SEC_RATE_KEY: &str = "sec.gov";

const DEFAULT_WWW_BASE: &str = "https://www.sec.gov";
const DEFAULT_DATA_BASE: &str = "https://data.sec.gov";

#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct SubmissionsResponse {
    #[serde(default)]
    name: Option<String>,
    filings: SubmissionsFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionsFilings {
    recent: RecentFilings,
}

#[derive(Debug, Deserialize)]
struct RecentFilings {
    #[serde(rename = "accessionNumber", default)]
    accession_number: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(rename = "filingDate", default)]
    filing_date: Vec<String>,
    #[serde(rename = "primaryDocument", default)]
    primary_document: Vec<String>,
}

/// Source adapter for `sec_edgar` jobs
pub struct SecEdgarAdapter {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    config: SecEdgarConfig,
    www_base: String,
    data_base: String,
}

impl SecEdgarAdapter {
    /// Build the adapter and its shared HTTP client
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be constructed.
    pub fn new(config: SecEdgarConfig, retry: RetryPolicy) -> SourceResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if !config.user_agent.is_empty() {
            builder = builder.user_agent(config.user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::Internal(format!("failed to build HTTP client: {e}")))?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Ok(Self {
            client,
            limiter,
            retry,
            config,
            www_base: DEFAULT_WWW_BASE.to_string(),
            data_base: DEFAULT_DATA_BASE.to_string(),
        })
    }

    /// Point the adapter at alternative endpoints (tests)
    pub fn with_endpoints(mut self, www_base: &str, data_base: &str) -> Self {
        self.www_base = www_base.trim_end_matches('/').to_string();
        self.data_base = data_base.trim_end_matches('/').to_string();
        self
    }

    fn expect_params<'a>(params: &'a SourceParams) -> SourceResult<&'a SecEdgarParams> {
        match params {
            SourceParams::SecEdgar(p) => Ok(p),
            other => Err(SourceError::Validation(format!(
                "sec_edgar adapter received {} parameters",
                other.source()
            ))),
        }
    }

    /// SEC requires contact info in the declared User-Agent
    fn validate_user_agent(&self) -> SourceResult<()> {
        let ua = &self.config.user_agent;
        if ua.contains('@') || ua.contains("://") {
            Ok(())
        } else {
            Err(SourceError::Validation(
                "sec_edgar_user_agent must include contact information (an email or URL)"
                    .to_string(),
            ))
        }
    }

    /// Fetch a body through the shared limiter and retry executor
    async fn get_text(&self, ctx: &FetchContext, url: &str) -> SourceResult<String> {
        self.retry
            .run(&ctx.cancel, || async move {
                self.limiter
                    .acquire_cancellable(SEC_RATE_KEY, &ctx.cancel)
                    .await?;
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, url))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::from_status(status.as_u16(), url));
                }
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| SourceError::from_transport(&e, url))?;
                if body.len() as u64 > self.config.max_filing_bytes {
                    return Err(SourceError::SizeExceeded(format!(
                        "{url}: {} bytes exceeds filing cap {}",
                        body.len(),
                        self.config.max_filing_bytes
                    )));
                }
                Ok(String::from_utf8_lossy(&body).into_owned())
            })
            .await
    }

    /// Resolve a ticker symbol to a 10-digit zero-padded CIK
    async fn resolve_ticker(&self, ctx: &FetchContext, ticker: &str) -> SourceResult<String> {
        let url = format!("{}/files/company_tickers.json", self.www_base);
        let body = self.get_text(ctx, &url).await?;
        let entries: HashMap<String, TickerEntry> = serde_json::from_str(&body)
            .map_err(|e| SourceError::Internal(format!("bad ticker mapping: {e}")))?;

        entries
            .values()
            .find(|entry| entry.ticker.eq_ignore_ascii_case(ticker))
            .map(|entry| format!("{:010}", entry.cik_str))
            .ok_or_else(|| SourceError::NotFound(format!("unknown ticker: {ticker}")))
    }

    fn zero_pad_cik(cik: &str) -> SourceResult<String> {
        let digits = cik.trim();
        if digits.is_empty() || digits.len() > 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SourceError::Validation(format!("invalid cik: {cik}")));
        }
        Ok(format!("{digits:0>10}"))
    }
}

#[async_trait]
impl SourceAdapter for SecEdgarAdapter {
    fn source(&self) -> &'static str {
        "sec_edgar"
    }

    fn validate(&self, params: &SourceParams) -> SourceResult<()> {
        let p = Self::expect_params(params)?;
        self.validate_user_agent()?;

        match (&p.ticker, &p.cik) {
            (Some(_), Some(_)) => {
                return Err(SourceError::Validation(
                    "provide exactly one of ticker or cik, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(SourceError::Validation(
                    "one of ticker or cik is required".to_string(),
                ));
            }
            _ => {}
        }
        if let Some(cik) = &p.cik {
            Self::zero_pad_cik(cik)?;
        }
        if !(1..=10).contains(&p.count) {
            return Err(SourceError::Validation(format!(
                "count must be within 1..=10, got {}",
                p.count
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

        let cik = match (&p.ticker, &p.cik) {
            (Some(ticker), _) => self.resolve_ticker(ctx, ticker).await?,
            (None, Some(cik)) => Self::zero_pad_cik(cik)?,
            (None, None) => {
                return Err(SourceError::Validation(
                    "one of ticker or cik is required".to_string(),
                ));
            }
        };

        let submissions_url = format!("{}/submissions/CIK{cik}.json", self.data_base);
        let body = self.get_text(ctx, &submissions_url).await?;
        let submissions: SubmissionsResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::Internal(format!("bad submissions index: {e}")))?;
        let recent = &submissions.filings.recent;
        let company_name = submissions.name.clone().unwrap_or_default();

        // The submissions index is parallel arrays over recent filings
        let mut selected: Vec<usize> = Vec::new();
        for index in 0..recent.form.len() {
            if selected.len() >= p.count as usize {
                break;
            }
            let form = recent.form.get(index).map(String::as_str).unwrap_or("");
            let matches = p
                .form_type
                .as_deref()
                .is_none_or(|wanted| wanted.eq_ignore_ascii_case(form));
            if matches {
                selected.push(index);
            }
        }
        if selected.is_empty() {
            return Err(SourceError::NotFound(format!(
                "no recent filings for CIK {cik}{}",
                p.form_type
                    .as_deref()
                    .map(|f| format!(" with form type {f}"))
                    .unwrap_or_default()
            )));
        }

        let cik_trimmed = cik.trim_start_matches('0');
        let mut documents = Vec::with_capacity(selected.len());
        for index in selected {
            if ctx.cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let accession = recent
                .accession_number
                .get(index)
                .cloned()
                .unwrap_or_default();
            let form = recent.form.get(index).cloned().unwrap_or_default();
            let filing_date = recent.filing_date.get(index).cloned().unwrap_or_default();
            let primary = recent
                .primary_document
                .get(index)
                .cloned()
                .unwrap_or_default();
            if accession.is_empty() || primary.is_empty() {
                tracing::warn!(index, "skipping filing with incomplete index entry");
                continue;
            }

            let accession_nodash = accession.replace('-', "");
            let filing_url = format!(
                "{}/Archives/edgar/data/{cik_trimmed}/{accession_nodash}/{primary}",
                self.www_base
            );
            let raw = self.get_text(ctx, &filing_url).await?;
            let text = html_to_text(&raw);

            let mut metadata = base_metadata("sec_edgar");
            metadata.insert("company_name".to_string(), company_name.clone().into());
            metadata.insert("cik".to_string(), cik.clone().into());
            if let Some(ticker) = &p.ticker {
                metadata.insert("ticker".to_string(), ticker.to_ascii_uppercase().into());
            }
            metadata.insert("form_type".to_string(), form.into());
            metadata.insert("filing_date".to_string(), filing_date.into());
            metadata.insert("accession_number".to_string(), accession.clone().into());
            metadata.insert("filing_url".to_string(), filing_url.into());

            documents.push(RawDocument::new(
                accession,
                text,
                metadata,
                ctx.tenant_id.clone(),
            ));
        }

        ensure_unique_document_ids(&mut documents);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            cik = %cik,
            filings = documents.len(),
            "sec_edgar fetch complete"
        );
        Ok(documents)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["text/html", "text/plain"]
    }
}
