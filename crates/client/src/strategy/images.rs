//! Cache-first with cleanup, for images.

use url::Url;

use barrio_core::Partition;

use super::fallback::FallbackKind;
use crate::engine::{CacheEngine, ResponseSource, SiteResponse};
use crate::fetch::url::short;
use crate::worker::WorkerMessage;

impl CacheEngine {
    pub(crate) async fn cache_first_with_cleanup(&self, url: &Url) -> SiteResponse {
        let key = url.as_str();
        let name = self.partition_name(Partition::Assets);

        match self.db().match_in(&name, key).await {
            Ok(Some(entry)) => {
                tracing::debug!(url = %short(key), "image from cache");
                self.notify(WorkerMessage::CacheHit { strategy: Partition::Assets.to_string(), url: key.to_string() })
                    .await;
                return SiteResponse::from_entry(entry, ResponseSource::Cache);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(url = %short(key), error = %e, "cache lookup failed"),
        }

        match self.fetcher().fetch(url).await {
            Ok(response) => {
                let served = SiteResponse::from_fetch(&response, key);
                let limit = self.config().limit_for(Partition::Assets);
                if let Err(e) = self.db().make_room(&name, limit, self.classifier()).await {
                    tracing::warn!(partition = %name, error = %e, "size limit not applied");
                }
                if let Err(e) = self.cache_response(Partition::Assets, key, response).await {
                    tracing::warn!(url = %short(key), error = %e, "image not cached");
                }
                served
            }
            Err(e) => {
                tracing::warn!(url = %short(key), error = %e, "image fetch failed");
                self.fallback(FallbackKind::Image, url).await
            }
        }
    }
}
