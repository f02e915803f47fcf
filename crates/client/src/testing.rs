//! Scripted fetcher and engine harness for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use barrio_core::config::RetryConfig;
use barrio_core::{AppConfig, CacheDb, Error, ManualClock};

use crate::engine::CacheEngine;
use crate::fetch::{FetchResponse, Fetcher};
use crate::worker::ServiceWorker;

#[derive(Clone)]
struct Route {
    status: u16,
    content_type: String,
    body: Bytes,
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, Route>,
    failures: HashMap<String, u32>,
    calls: HashMap<String, usize>,
    requested: Vec<String>,
    offline: bool,
}

/// In-memory [`Fetcher`] keyed by URL path. Query strings are ignored for
/// routing but recorded in [`MockFetcher::requested`].
#[derive(Default)]
pub struct MockFetcher {
    state: Mutex<MockState>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, path: &str, status: u16, content_type: &str, body: impl Into<Vec<u8>>) {
        let route = Route { status, content_type: content_type.to_string(), body: Bytes::from(body.into()) };
        self.state.lock().unwrap().routes.insert(path.to_string(), route);
    }

    /// Fail the next `n` requests for `path` with a network error.
    pub fn fail_next(&self, path: &str, n: u32) {
        self.state.lock().unwrap().failures.insert(path.to_string(), n);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn calls(&self, path: &str) -> usize {
        self.state.lock().unwrap().calls.get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    /// Full URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.state.lock().unwrap().requested.clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, Error> {
        let mut state = self.state.lock().unwrap();
        let path = url.path().to_string();
        *state.calls.entry(path.clone()).or_default() += 1;
        state.requested.push(url.to_string());

        if state.offline {
            return Err(Error::HttpError("network error: offline".into()));
        }

        if let Some(remaining) = state.failures.get_mut(&path)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::HttpError("network error: connection reset".into()));
        }

        match state.routes.get(&path) {
            Some(route) if (200..300).contains(&route.status) => {
                Ok(FetchResponse::new(url.clone(), route.status, Some(route.content_type.as_str()), route.body.clone()))
            }
            Some(route) => Err(Error::HttpError(format!("status {}", route.status))),
            None => Err(Error::HttpError("status 404".into())),
        }
    }
}

/// Configuration with millisecond retry delays.
pub fn test_config() -> AppConfig {
    AppConfig {
        retry: RetryConfig { max_retries: 2, base_delay_ms: 1, max_delay_ms: 2, precache_base_delay_ms: 1 },
        ..Default::default()
    }
}

pub const T0: i64 = 1_700_000_000_000;

pub struct Harness {
    pub engine: CacheEngine,
    pub fetcher: Arc<MockFetcher>,
    pub clock: Arc<ManualClock>,
}

pub async fn harness_with(config: AppConfig) -> Harness {
    let db = CacheDb::open_in_memory().await.unwrap();
    let fetcher = Arc::new(MockFetcher::new());
    let clock = Arc::new(ManualClock::new(T0));
    let engine = CacheEngine::new(config, db, fetcher.clone(), clock.clone()).unwrap();
    Harness { engine, fetcher, clock }
}

pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

/// Worker that has been installed and activated.
pub async fn active_worker(config: AppConfig) -> (ServiceWorker, Arc<MockFetcher>, Arc<ManualClock>) {
    let h = harness_with(config).await;
    let worker = ServiceWorker::new(h.engine);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    (worker, h.fetcher, h.clock)
}
