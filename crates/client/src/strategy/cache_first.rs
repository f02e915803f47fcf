//! Cache-first with background update, for critical and static resources.

use std::time::Duration;

use url::Url;

use barrio_core::Partition;

use super::fallback::FallbackKind;
use crate::engine::{CacheEngine, ResponseSource, SiteResponse};
use crate::fetch::fetch_with_retry;
use crate::fetch::url::short;

/// Age after which a cached critical or static entry is refreshed in the
/// background. Separate from the per-partition TTLs.
pub const BACKGROUND_REVALIDATE_AFTER: Duration = Duration::from_secs(60 * 60);

impl CacheEngine {
    pub(crate) async fn cache_first_with_update(&self, url: &Url, partition: Partition, kind: FallbackKind) -> SiteResponse {
        let key = url.as_str();

        match self.db().match_any(&self.config().current_partition_names(), key).await {
            Ok(Some(entry)) => {
                tracing::debug!(url = %short(key), "served from cache");
                self.revalidate_in_background(url, partition, entry.inserted_at);
                return SiteResponse::from_entry(entry, ResponseSource::Cache);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(url = %short(key), error = %e, "cache lookup failed"),
        }

        match fetch_with_retry(self.fetcher(), url, self.request_policy()).await {
            Ok(response) => {
                let served = SiteResponse::from_fetch(&response, key);
                if let Err(e) = self.cache_response(partition, key, response).await {
                    tracing::warn!(url = %short(key), error = %e, "response not cached");
                }
                served
            }
            Err(e) => {
                tracing::warn!(url = %short(key), error = %e, "cache-first fetch failed");
                self.fallback(kind, url).await
            }
        }
    }

    /// Fire-and-forget refresh when the cached copy is older than
    /// [`BACKGROUND_REVALIDATE_AFTER`]. The caller never waits on it.
    fn revalidate_in_background(&self, url: &Url, partition: Partition, inserted_at: i64) {
        let age_ms = self.now_ms().saturating_sub(inserted_at);
        if age_ms < BACKGROUND_REVALIDATE_AFTER.as_millis() as i64 {
            return;
        }

        let engine = self.clone();
        let url = url.clone();
        tokio::spawn(async move {
            match engine.fetcher().fetch(&url).await {
                Ok(response) => match engine.cache_response(partition, url.as_str(), response).await {
                    Ok(()) => tracing::info!(url = %short(url.as_str()), "background update"),
                    Err(e) => tracing::debug!(url = %short(url.as_str()), error = %e, "background update not stored"),
                },
                Err(e) => tracing::debug!(url = %short(url.as_str()), error = %e, "background update failed"),
            }
        });
    }
}
