use crate::config::Settings;
use crate::domain::market::MarketIndex;
use crate::domain::signal::{DailyBar, FinancialRow, Quote};
use crate::error::SourceError;
use anyhow::{Context, Result};
use encoding_rs::{Encoding, EUC_KR, UTF_8};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;

/// Retry delays double from one second and stop growing after this many doublings.
const MAX_BACKOFF_DOUBLINGS: u32 = 6;

#[async_trait::async_trait]
pub trait QuoteFeed: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// One batch call for all ids. Ids missing from the response are absent from the map.
    async fn fetch_current_quotes(&self, stock_ids: &[String]) -> Result<HashMap<String, Quote>>;
}

#[async_trait::async_trait]
pub trait FinancialFeed: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Annual rows, oldest first.
    async fn fetch_annual_financials(&self, stock_id: &str) -> Result<Vec<FinancialRow>>;
}

#[async_trait::async_trait]
pub trait DailySeriesFeed: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Up to `count` trailing daily bars, oldest first.
    async fn fetch_daily_series(&self, stock_id: &str, count: usize) -> Result<Vec<DailyBar>>;
}

#[async_trait::async_trait]
pub trait IndexFeed: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// KOSPI, KOSDAQ and KOSPI 200 levels, in feed order.
    async fn fetch_kr_indices(&self) -> Result<Vec<MarketIndex>>;
}

/// GET with bounded retries and charset-aware body decoding, shared by the feed clients.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    name: &'static str,
    retries: u32,
}

impl HttpSource {
    pub fn from_settings(settings: &Settings, name: &'static str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .user_agent("Mozilla/5.0")
            .build()
            .with_context(|| format!("failed to build {name} http client"))?;

        Ok(Self {
            http,
            name,
            retries: settings.http_retries.max(1),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(url, query).await {
                Ok(text) => return Ok(text),
                Err(FetchFailure::Fatal(err)) => return Err(err.into()),
                Err(FetchFailure::Retryable(err)) => {
                    if attempt >= self.retries {
                        return Err(err.into());
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(
                        source = self.name,
                        attempt,
                        ?backoff,
                        error = %err,
                        "source request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<String, FetchFailure> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                FetchFailure::Retryable(SourceError::unavailable(
                    self.name,
                    format!("request failed: {e}"),
                ))
            })?;

        let status = res.status();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = res.bytes().await.map_err(|e| {
            FetchFailure::Retryable(SourceError::unavailable(
                self.name,
                format!("failed to read body: {e}"),
            ))
        })?;

        if !status.is_success() {
            let err = SourceError::unavailable(self.name, format!("HTTP {status}"));
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(if retryable {
                FetchFailure::Retryable(err)
            } else {
                FetchFailure::Fatal(err)
            });
        }

        Ok(decode_body(&bytes, content_type.as_deref()))
    }
}

fn retry_backoff(attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
    Duration::from_secs(1u64 << doublings)
}

enum FetchFailure {
    Retryable(SourceError),
    Fatal(SourceError),
}

/// Decodes a response body. Korean market pages are frequently EUC-KR; the charset is
/// taken from the Content-Type header or an XML/HTML declaration near the top.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_from_header)
        .or_else(|| charset_from_prolog(bytes))
        .unwrap_or(UTF_8);
    let (cow, _, _) = encoding.decode(bytes);
    cow.into_owned()
}

fn charset_from_header(content_type: &str) -> Option<&'static Encoding> {
    let lower = content_type.to_ascii_lowercase();
    let (_, charset) = lower.split_once("charset=")?;
    let label = charset.trim().trim_matches('"').split(';').next()?.trim();
    Encoding::for_label(label.as_bytes())
}

fn charset_from_prolog(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    if head.contains("euc-kr") || head.contains("ks_c_5601") {
        Some(EUC_KR)
    } else {
        None
    }
}
