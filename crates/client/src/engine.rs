//! Shared state every strategy and lifecycle step works against.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use barrio_core::{AppConfig, CacheDb, CacheEntry, Classifier, Clock, Error, FreshnessTracker, Partition};

use crate::fetch::{FetchResponse, Fetcher, RetryPolicy, UrlError, parse_origin, resolve};
use crate::worker::{ClientRegistry, WorkerMessage};

/// A request as seen by the fetch interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRequest {
    pub method: String,
    /// Absolute URL or a site path.
    pub url: String,
    /// Top-level page navigation rather than a subresource.
    #[serde(default)]
    pub navigate: bool,
}

impl SiteRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: "GET".into(), url: url.into(), navigate: false }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self { method: "GET".into(), url: url.into(), navigate: true }
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Cached copy past its TTL, served because the network failed.
    StaleCache,
    Fallback,
}

/// Response handed back to the page.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteResponse {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl SiteResponse {
    pub fn from_entry(entry: CacheEntry, source: ResponseSource) -> Self {
        Self { url: entry.url, status: entry.status, headers: entry.headers, body: Bytes::from(entry.body), source }
    }

    /// Network response as returned to the page, before it is stored.
    pub fn from_fetch(response: &FetchResponse, key: &str) -> Self {
        Self {
            url: key.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.bytes.clone(),
            source: ResponseSource::Network,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Cache engine dependencies: configuration, storage, network, freshness
/// and the open pages. Cloning is cheap and shares everything.
#[derive(Clone)]
pub struct CacheEngine {
    config: Arc<AppConfig>,
    origin: Url,
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    tracker: FreshnessTracker,
    classifier: Arc<Classifier>,
    clock: Arc<dyn Clock>,
    clients: ClientRegistry,
}

impl CacheEngine {
    pub fn new(config: AppConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        let origin = parse_origin(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let tracker = FreshnessTracker::new(&config, clock.clone());
        let classifier = Arc::new(Classifier::new(&config));
        let clients = ClientRegistry::new(config.inbox_limit);
        Ok(Self {
            config: Arc::new(config),
            origin,
            db,
            fetcher,
            tracker,
            classifier,
            clock,
            clients,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn tracker(&self) -> &FreshnessTracker {
        &self.tracker
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn partition_name(&self, partition: Partition) -> String {
        self.config.partition_name(partition)
    }

    /// Resolve a request URL (absolute or path) against the origin.
    pub fn resolve(&self, input: &str) -> Result<Url, UrlError> {
        resolve(&self.origin, input)
    }

    /// URL of a site path, with the base path applied.
    pub fn site_url(&self, path: &str) -> Result<Url, UrlError> {
        resolve(&self.origin, &self.config.full_path(path))
    }

    pub fn request_policy(&self) -> RetryPolicy {
        RetryPolicy::request(&self.config.retry)
    }

    /// Store a network response under `key`, stamp its freshness and
    /// bring the partition back within its size limit.
    pub async fn cache_response(&self, partition: Partition, key: &str, response: FetchResponse) -> Result<(), Error> {
        let entry = response.into_entry(key, self.now_ms());
        self.db.put(&self.partition_name(partition), &entry).await?;
        self.tracker.record_fetch(key, partition).await;
        self.enforce_limit(partition).await;
        Ok(())
    }

    /// Apply the partition's size limit. Failures are logged, never raised.
    async fn enforce_limit(&self, partition: Partition) {
        let name = self.partition_name(partition);
        if let Err(e) = self
            .db
            .limit_partition_size(&name, self.config.limit_for(partition), &self.classifier)
            .await
        {
            tracing::warn!(partition = %name, error = %e, "size limit not applied");
        }
    }

    /// Broadcast to every open page.
    pub async fn notify(&self, message: WorkerMessage) {
        self.clients.notify_all(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{T0, harness};

    #[tokio::test]
    async fn test_new_rejects_bad_origin() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        let fetcher = Arc::new(crate::testing::MockFetcher::new());
        let result = CacheEngine::new(config, db, fetcher, Arc::new(barrio_core::SystemClock));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_site_url_applies_base_path() {
        let config = AppConfig {
            origin: "https://someone.github.io".into(),
            base_path: "/Zona-Tu-Barrio".into(),
            ..Default::default()
        };
        let h = crate::testing::harness_with(config).await;
        let url = h.engine.site_url("/shared/offline.html").unwrap();
        assert_eq!(url.as_str(), "https://someone.github.io/Zona-Tu-Barrio/shared/offline.html");
    }

    #[tokio::test]
    async fn test_cache_response_records_freshness() {
        let h = harness().await;
        let url = h.engine.resolve("/api/status").unwrap();
        let response = FetchResponse::new(url.clone(), 200, Some("application/json"), &b"{}"[..]);

        h.engine.cache_response(Partition::Api, url.as_str(), response).await.unwrap();

        let entry = h.engine.db().match_in("api-v60-multi", url.as_str()).await.unwrap().unwrap();
        assert_eq!(entry.inserted_at, T0);
        assert_eq!(h.engine.tracker().last_fetch(url.as_str(), Partition::Api).await, Some(T0));
    }

    #[tokio::test]
    async fn test_cache_response_applies_limit() {
        let mut config = crate::testing::test_config();
        config.limits.api_items = 3;
        let h = crate::testing::harness_with(config).await;

        for i in 0..6 {
            let url = h.engine.resolve(&format!("/api/items/{i}")).unwrap();
            let response = FetchResponse::new(url.clone(), 200, Some("application/json"), &b"{}"[..]);
            h.engine.cache_response(Partition::Api, url.as_str(), response).await.unwrap();
            h.clock.advance_ms(1);
        }

        let keys = h.engine.db().keys("api-v60-multi").await.unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"https://www.tubarrioaunclik.com/api/items/5".to_string()));
        assert!(!keys.contains(&"https://www.tubarrioaunclik.com/api/items/0".to_string()));
    }

    #[test]
    fn test_request_constructors() {
        assert!(!SiteRequest::get("/a").navigate);
        assert!(SiteRequest::navigate("/a").navigate);
        assert_eq!(SiteRequest::get("/a").method, "GET");
    }
}
