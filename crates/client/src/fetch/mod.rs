//! HTTP fetch pipeline for the cache engine.
//!
//! ### Network seam
//! - Strategies talk to the network only through the [`Fetcher`] trait, so
//!   tests can script responses and simulate going offline.
//! - [`FetchClient`] is the reqwest-backed implementation.
//!
//! ### Failure model
//! - Transport errors, timeouts and non-2xx statuses are all `Err`.
//! - Max body bytes: 5MB (configurable)
//! - Max redirects: 5
//!
//! ### Retry
//! - Request-time: `min(base * 2^attempt, max)` between attempts.
//! - Install-time: `2^attempt * precache_base` with a priority-derived budget.

pub mod retry;
pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};

pub use retry::{RetryPolicy, fetch_with_retry};
pub use self::url::{UrlError, parse_origin, resolve, same_origin, with_cache_buster};

use barrio_core::{AppConfig, CacheEntry, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "barrio-sw/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "barrio-sw/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// A successful (2xx) network response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: ::url::Url,
    /// The final URL after redirects
    pub final_url: ::url::Url,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response headers, lowercased names
    pub headers: BTreeMap<String, String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Minimal response, mostly for scripted fetchers.
    pub fn new(url: ::url::Url, status: u16, content_type: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        let mut headers = BTreeMap::new();
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        Self {
            final_url: url.clone(),
            url,
            status,
            content_type: content_type.map(str::to_string),
            headers,
            bytes: bytes.into(),
            fetch_ms: 0,
        }
    }

    /// Convert into a storable entry keyed by `key` (the clean request URL).
    pub fn into_entry(self, key: &str, inserted_at: i64) -> CacheEntry {
        CacheEntry { url: key.to_string(), status: self.status, headers: self.headers, body: self.bytes.to_vec(), inserted_at }
    }
}

/// Network access used by the strategies.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`. Non-2xx responses are errors.
    async fn fetch(&self, url: &::url::Url) -> Result<FetchResponse, Error>;
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, url: &::url::Url) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let response = self
            .http
            .get(url.as_str())
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::FetchTimeout(format!("{url}: {e}"))
                } else {
                    Error::HttpError(format!("network error: {}", e))
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_lowercase(), v.to_string())))
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::HttpError(format!("failed to read response: {}", e)))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let content_type = headers.get("content-type").cloned();
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(url = %url, final_url = %final_url, fetch_ms, bytes = bytes.len(), "fetched");

        Ok(FetchResponse { url: url.clone(), final_url, status: status.as_u16(), content_type, headers, bytes, fetch_ms })
    }
}
