//! Page → worker control channel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;

use futures_util::future::join_all;
use url::Url;

use barrio_core::{Error, Partition};

use super::ServiceWorker;
use super::lifecycle::WorkerState;
use super::messages::{CacheStatus, ControlMessage, WorkerMessage, WorkerStatus};
use crate::engine::CacheEngine;
use crate::fetch::url::short;
use crate::fetch::{same_origin, with_cache_buster};

impl ServiceWorker {
    /// Decode and dispatch a raw JSON control message.
    pub async fn handle_json(&self, value: serde_json::Value) -> Result<Option<WorkerMessage>, Error> {
        let message = ControlMessage::from_json(value).inspect_err(|e| tracing::warn!(error = %e, "unrecognized message"))?;
        self.handle_message(message).await
    }

    /// Run a control message. Returns the reply, if the message has one.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<Option<WorkerMessage>, Error> {
        tracing::info!(?message, "message received");

        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                if self.state().await == WorkerState::Waiting {
                    self.activate().await?;
                }
                Ok(None)
            }
            ControlMessage::CleanCache => {
                self.clean_dynamic_caches().await?;
                Ok(Some(WorkerMessage::CacheCleaned))
            }
            ControlMessage::GetContext => {
                let config = self.engine.config();
                Ok(Some(WorkerMessage::AppContext {
                    context: self.context.to_string(),
                    version: config.cache_version.clone(),
                    environment: config.environment().to_string(),
                    base_path: config.base_path.clone(),
                    precache_complete: self.precache_complete(),
                }))
            }
            ControlMessage::RefreshContent { localidad } => {
                if let Some(locality) = localidad.as_deref() {
                    self.refresh_content(locality).await;
                }
                Ok(Some(WorkerMessage::ContentRefreshed))
            }
            ControlMessage::CacheResource { url, strategy } => {
                if let Some(strategy) = strategy.as_deref() {
                    tracing::debug!(url, strategy, "strategy hint ignored; partition follows classification");
                }
                let success = self.cache_resource(&url).await;
                Ok(Some(WorkerMessage::CacheResult { success }))
            }
            ControlMessage::RefreshBusinessData { localidad, timestamp } => {
                if let Some(locality) = localidad.as_deref() {
                    self.refresh_business_data(locality, timestamp).await;
                }
                Ok(Some(WorkerMessage::BusinessDataRefreshed))
            }
            ControlMessage::PageFocus => {
                self.refresh_open_pages().await;
                Ok(None)
            }
            ControlMessage::GetCacheStatus => {
                let status = self.cache_status().await;
                Ok(Some(WorkerMessage::CacheStatus { status, context: self.context.to_string() }))
            }
        }
    }

    /// Empty the api, business and dynamic partitions and their freshness records.
    pub async fn clean_dynamic_caches(&self) -> Result<u64, Error> {
        let mut removed = 0;
        for partition in Partition::DYNAMIC {
            let name = self.engine.partition_name(partition);
            let count = self.engine.db().clear_partition(&name).await?;
            self.engine.tracker().clear(partition).await;
            tracing::info!(partition = %name, count, "dynamic partition cleared");
            removed += count;
        }
        self.engine.notify(WorkerMessage::CacheCleared).await;
        Ok(removed)
    }

    /// Re-fetch a locality's pages. Unknown localities are ignored.
    pub async fn refresh_content(&self, locality: &str) -> usize {
        if !self.engine.classifier().is_locality(locality) {
            tracing::warn!(locality, "refresh for unknown locality ignored");
            return 0;
        }
        tracing::info!(locality, "refreshing locality pages");

        let stamp = self.engine.now_ms().to_string();
        let urls: Vec<Url> = self
            .engine
            .config()
            .locality_pages
            .iter()
            .filter_map(|page| self.engine.site_url(&format!("/{locality}/{page}")).ok())
            .collect();

        refresh_all(&self.engine, &urls, "t", &stamp).await
    }

    /// Re-fetch a locality's business listing. True when it was stored.
    pub async fn refresh_business_data(&self, locality: &str, timestamp: Option<i64>) -> bool {
        if !self.engine.classifier().is_locality(locality) {
            tracing::warn!(locality, "business refresh for unknown locality ignored");
            return false;
        }

        let Ok(url) = self.engine.site_url(&format!("/{locality}/data/comercios.json")) else {
            return false;
        };
        let stamp = timestamp.unwrap_or_else(|| self.engine.now_ms()).to_string();
        let refreshed = refresh_all(&self.engine, std::slice::from_ref(&url), "refresh", &stamp).await == 1;
        if refreshed {
            tracing::info!(locality, "business data refreshed");
        } else {
            tracing::error!(locality, "business data refresh failed");
        }
        refreshed
    }

    /// Re-fetch the distinct same-origin pages currently open.
    pub async fn refresh_open_pages(&self) -> usize {
        let mut paths = BTreeSet::new();
        for client in self.engine.clients().match_all().await {
            if let Ok(url) = Url::parse(&client.url)
                && same_origin(&url, self.engine.origin())
            {
                paths.insert(url.path().to_string());
            }
        }

        let urls: Vec<Url> = paths.iter().filter_map(|p| self.engine.resolve(p).ok()).collect();
        tracing::info!(pages = urls.len(), "refreshing open pages");

        let stamp = self.engine.now_ms().to_string();
        refresh_all(&self.engine, &urls, "focus_refresh", &stamp).await
    }

    /// Fetch one same-origin URL into its classified partition. False on any failure.
    pub async fn cache_resource(&self, url: &str) -> bool {
        let target = match self.engine.resolve(url) {
            Ok(target) => target,
            Err(e) => {
                tracing::error!(url, error = %e, "resource not cached");
                return false;
            }
        };
        if !same_origin(&target, self.engine.origin()) {
            tracing::warn!(url = %short(target.as_str()), "cross-origin resource not cached");
            return false;
        }
        let partition = self.engine.classifier().classify(target.path()).class.partition();

        let result = match self.engine.fetcher().fetch(&target).await {
            Ok(response) => self.engine.cache_response(partition, target.as_str(), response).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(url = %short(target.as_str()), %partition, "resource cached");
                true
            }
            Err(e) => {
                tracing::error!(url = %short(target.as_str()), error = %e, "resource not cached");
                false
            }
        }
    }

    /// Entry counts, freshness records and lifecycle state.
    pub async fn cache_status(&self) -> CacheStatus {
        let mut sizes = BTreeMap::new();
        for name in self.engine.config().current_partition_names() {
            let count = match self.engine.db().entry_count(&name).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!(partition = %name, error = %e, "entry count failed");
                    0
                }
            };
            sizes.insert(name, count);
        }
        let total_items = sizes.values().sum();

        CacheStatus {
            sizes,
            timestamps: self.engine.tracker().snapshot().await,
            state: WorkerStatus {
                lifecycle: self.state().await.to_string(),
                context: self.context.to_string(),
                precache_complete: self.precache_complete(),
                last_update: self.last_update.load(Ordering::SeqCst),
                start_time: self.started_at,
            },
            total_items,
        }
    }
}

/// Fetch each URL with a cache-busting parameter and store it under the
/// clean URL in its classified partition. Failures are logged and skipped.
async fn refresh_all(engine: &CacheEngine, urls: &[Url], param: &str, stamp: &str) -> usize {
    let refreshes = urls.iter().map(|url| async move {
        let partition = engine.classifier().classify(url.path()).class.partition();
        let result = match engine.fetcher().fetch(&with_cache_buster(url, param, stamp)).await {
            Ok(response) => engine.cache_response(partition, url.as_str(), response).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                tracing::debug!(url = %short(url.as_str()), %partition, "refreshed");
                true
            }
            Err(e) => {
                tracing::warn!(url = %short(url.as_str()), error = %e, "refresh failed");
                false
            }
        }
    });

    join_all(refreshes).await.into_iter().filter(|ok| *ok).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ResponseSource;
    use crate::testing::{active_worker, harness, test_config};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_context_reply() {
        let mut config = test_config();
        config.scope = "/castelar/sw.js".into();
        let (worker, _, _) = active_worker(config).await;

        let reply = worker.handle_json(json!({"type": "GET_CONTEXT"})).await.unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({
                "type": "APP_CONTEXT",
                "context": "castelar",
                "version": "v60-multi",
                "environment": "netlify",
                "basePath": "",
                "precacheComplete": true
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_message_rejected() {
        let (worker, _, _) = active_worker(test_config()).await;
        assert!(matches!(worker.handle_json(json!({"type": "NOPE"})).await, Err(Error::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_skip_waiting_activates() {
        let mut config = test_config();
        config.skip_waiting_on_install = false;
        let h = crate::testing::harness_with(config).await;
        let worker = ServiceWorker::new(h.engine);
        assert_eq!(worker.start().await.unwrap(), WorkerState::Waiting);

        assert_eq!(worker.handle_message(ControlMessage::SkipWaiting).await.unwrap(), None);
        assert_eq!(worker.state().await, WorkerState::Active);
        // Already active: nothing to do.
        assert_eq!(worker.handle_message(ControlMessage::SkipWaiting).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clean_cache() {
        let (worker, fetcher, _) = active_worker(test_config()).await;
        fetcher.route("/castelar/data/farmacias.json", 200, "application/json", "[]");
        fetcher.route("/api/status", 200, "application/json", "{}");
        fetcher.route("/shared/css/styles.css", 200, "text/css", "body{}");
        let engine = worker.engine().clone();
        for path in ["/castelar/data/farmacias.json", "/api/status", "/shared/css/styles.css"] {
            engine.respond(&engine.resolve(path).unwrap(), false).await;
        }
        let page = engine.clients().open_window("https://www.tubarrioaunclik.com/", true).await;

        let reply = worker.handle_message(ControlMessage::CleanCache).await.unwrap();

        assert_eq!(reply, Some(WorkerMessage::CacheCleaned));
        assert_eq!(engine.db().entry_count("business-v60-multi").await.unwrap(), 0);
        assert_eq!(engine.db().entry_count("api-v60-multi").await.unwrap(), 0);
        assert_eq!(engine.db().entry_count("static-v60-multi").await.unwrap(), 1);
        assert!(engine.tracker().snapshot().await.get("business").is_none());
        assert_eq!(engine.clients().take_messages(&page.id).await.unwrap(), vec![WorkerMessage::CacheCleared]);
    }

    #[tokio::test]
    async fn test_refresh_content_busts_cache() {
        let (worker, fetcher, _) = active_worker(test_config()).await;
        fetcher.route("/moron/index.html", 200, "text/html", "<html>nuevo</html>");
        fetcher.route("/moron/comunidad.html", 200, "text/html", "<html></html>");

        let reply = worker.handle_json(json!({"type": "REFRESH_CONTENT", "localidad": "moron"})).await.unwrap();
        assert_eq!(reply, Some(WorkerMessage::ContentRefreshed));

        let index = "https://www.tubarrioaunclik.com/moron/index.html";
        let stored = worker.engine().db().match_in("static-v60-multi", index).await.unwrap().unwrap();
        assert_eq!(stored.body, b"<html>nuevo</html>".to_vec());
        assert!(fetcher.requested().iter().any(|u| u.starts_with(&format!("{index}?t="))));
        assert_eq!(fetcher.calls("/moron/offline.html"), 1);
    }

    #[tokio::test]
    async fn test_refresh_unknown_locality_is_noop() {
        let (worker, fetcher, _) = active_worker(test_config()).await;
        let before = fetcher.total_calls();

        assert_eq!(worker.refresh_content("atlantis").await, 0);
        assert!(!worker.refresh_business_data("atlantis", None).await);
        let reply = worker.handle_json(json!({"type": "REFRESH_CONTENT"})).await.unwrap();

        assert_eq!(reply, Some(WorkerMessage::ContentRefreshed));
        assert_eq!(fetcher.total_calls(), before);
    }

    #[tokio::test]
    async fn test_refresh_business_data_uses_timestamp() {
        let (worker, fetcher, _) = active_worker(test_config()).await;
        fetcher.route("/haedo/data/comercios.json", 200, "application/json", "[]");

        let reply = worker
            .handle_message(ControlMessage::RefreshBusinessData { localidad: Some("haedo".into()), timestamp: Some(42) })
            .await
            .unwrap();

        assert_eq!(reply, Some(WorkerMessage::BusinessDataRefreshed));
        let clean = "https://www.tubarrioaunclik.com/haedo/data/comercios.json";
        assert!(fetcher.requested().contains(&format!("{clean}?refresh=42")));
        assert!(worker.engine().db().match_in("business-v60-multi", clean).await.unwrap().is_some());
        assert!(worker.engine().tracker().is_fresh(clean, Partition::Business).await);
    }

    #[tokio::test]
    async fn test_page_focus_refreshes_open_pages_once() {
        let (worker, fetcher, _) = active_worker(test_config()).await;
        fetcher.route("/castelar/comunidad", 200, "text/html", "<html></html>");
        let clients = worker.engine().clients();
        clients.open_window("https://www.tubarrioaunclik.com/castelar/comunidad", true).await;
        clients.open_window("https://www.tubarrioaunclik.com/castelar/comunidad#top", true).await;
        clients.open_window("https://elsewhere.example/castelar/comunidad", true).await;

        assert_eq!(worker.handle_message(ControlMessage::PageFocus).await.unwrap(), None);

        assert_eq!(fetcher.calls("/castelar/comunidad"), 1);
        let page = "https://www.tubarrioaunclik.com/castelar/comunidad";
        assert!(worker.engine().db().match_in("dynamic-v60-multi", page).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cache_resource_served_offline() {
        let (worker, fetcher, clock) = active_worker(test_config()).await;
        fetcher.route("/castelar/data/farmacias.json", 200, "application/json", "[]");

        let reply = worker
            .handle_json(json!({"type": "CACHE_RESOURCE", "url": "/castelar/data/farmacias.json", "strategy": "static"}))
            .await
            .unwrap();
        assert_eq!(reply, Some(WorkerMessage::CacheResult { success: true }));

        let engine = worker.engine();
        let url = engine.resolve("/castelar/data/farmacias.json").unwrap();
        assert!(engine.db().match_in("business-v60-multi", url.as_str()).await.unwrap().is_some());
        assert!(engine.db().match_in("static-v60-multi", url.as_str()).await.unwrap().is_none());

        fetcher.set_offline(true);
        clock.advance_ms(60 * 60 * 1000);
        let served = engine.respond(&url, false).await;
        assert_eq!(served.source, ResponseSource::StaleCache);
        assert_eq!(served.body.as_ref(), b"[]");
    }

    #[tokio::test]
    async fn test_cache_resource_rejects_cross_origin_and_failures() {
        let (worker, fetcher, _) = active_worker(test_config()).await;
        fetcher.route("/promo/banner.txt", 200, "text/plain", "promo");
        let before = fetcher.total_calls();

        assert!(!worker.cache_resource("https://elsewhere.example/promo/banner.txt").await);
        assert_eq!(fetcher.total_calls(), before);

        let reply = worker
            .handle_json(json!({"type": "CACHE_RESOURCE", "url": "/promo/missing.txt"}))
            .await
            .unwrap();
        assert_eq!(reply, Some(WorkerMessage::CacheResult { success: false }));
    }

    #[tokio::test]
    async fn test_refreshes_respect_partition_limit() {
        let mut config = test_config();
        config.limits.dynamic_items = 2;
        let (worker, fetcher, _) = active_worker(config).await;
        let clients = worker.engine().clients();
        for i in 1..=5 {
            let path = format!("/castelar/pagina-{i}");
            fetcher.route(&path, 200, "text/html", "<html></html>");
            clients.open_window(&format!("https://www.tubarrioaunclik.com{path}"), true).await;
        }

        assert_eq!(worker.refresh_open_pages().await, 5);
        assert_eq!(worker.handle_message(ControlMessage::PageFocus).await.unwrap(), None);

        assert!(worker.engine().db().entry_count("dynamic-v60-multi").await.unwrap() <= 2);
    }

    #[tokio::test]
    async fn test_cache_status() {
        let h = harness().await;
        h.fetcher.route("/shared/css/styles.css", 200, "text/css", "body{}");
        let worker = ServiceWorker::new(h.engine.clone());
        worker.install().await.unwrap();

        let Some(WorkerMessage::CacheStatus { status, context }) =
            worker.handle_message(ControlMessage::GetCacheStatus).await.unwrap()
        else {
            panic!("expected CACHE_STATUS");
        };

        assert_eq!(context, "selector");
        assert_eq!(status.sizes.len(), 5);
        assert_eq!(status.sizes["static-v60-multi"], 1);
        assert_eq!(status.total_items, 1);
        assert_eq!(status.state.lifecycle, "waiting");
        assert!(status.state.precache_complete);
        assert!(status.timestamps["static"].contains_key("https://www.tubarrioaunclik.com/shared/css/styles.css"));
    }
}
