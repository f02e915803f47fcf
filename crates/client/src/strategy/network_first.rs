//! Network-first with cache fallback, for API, business and dynamic resources.

use url::Url;

use barrio_core::Partition;

use super::fallback::FallbackKind;
use crate::engine::{CacheEngine, ResponseSource, SiteResponse};
use crate::fetch::fetch_with_retry;
use crate::fetch::url::short;
use crate::worker::WorkerMessage;

impl CacheEngine {
    pub(crate) async fn network_first(&self, url: &Url, partition: Partition, kind: FallbackKind) -> SiteResponse {
        let key = url.as_str();
        let name = self.partition_name(partition);

        let mut cached = match self.db().match_in(&name, key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(url = %short(key), error = %e, "cache lookup failed");
                None
            }
        };

        if cached.is_some()
            && self.tracker().is_fresh(key, partition).await
            && let Some(entry) = cached.take()
        {
            tracing::debug!(url = %short(key), %partition, "fresh from cache");
            self.notify(WorkerMessage::CacheHit { strategy: partition.to_string(), url: key.to_string() }).await;
            return SiteResponse::from_entry(entry, ResponseSource::Cache);
        }

        match fetch_with_retry(self.fetcher(), url, self.request_policy()).await {
            Ok(response) => {
                let served = SiteResponse::from_fetch(&response, key);
                if let Err(e) = self.cache_response(partition, key, response).await {
                    tracing::warn!(url = %short(key), error = %e, "response not cached");
                }
                tracing::debug!(url = %short(key), %partition, "from network");
                served
            }
            Err(e) => {
                tracing::warn!(url = %short(key), %partition, error = %e, "network failed");
                match cached {
                    Some(entry) => {
                        tracing::info!(url = %short(key), "serving stale cache");
                        self.notify(WorkerMessage::CacheMiss { strategy: partition.to_string(), url: key.to_string() })
                            .await;
                        SiteResponse::from_entry(entry, ResponseSource::StaleCache)
                    }
                    None => self.fallback(kind, url).await,
                }
            }
        }
    }
}
