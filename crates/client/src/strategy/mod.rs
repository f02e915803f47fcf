//! Fetch strategies.
//!
//! One policy per resource class, picked from the classifier output:
//!
//! | class                  | strategy                          |
//! |------------------------|-----------------------------------|
//! | critical, static       | cache-first with background update|
//! | business, api, dynamic | network-first with cache fallback |
//! | image                  | cache-first with cleanup          |
//!
//! Every path ends in a response. Network and storage failures turn into a
//! stale cached copy or a fallback response, never an error.

mod cache_first;
mod fallback;
mod images;
mod network_first;

use url::Url;

use barrio_core::{Classification, Partition, ResourceClass};

pub use cache_first::BACKGROUND_REVALIDATE_AFTER;
pub use fallback::{FallbackKind, OFFLINE_HTML, PLACEHOLDER_SVG};

use crate::engine::{CacheEngine, SiteResponse};

/// Request-handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirstWithUpdate,
    NetworkFirst(Partition),
    CacheFirstWithCleanup,
}

/// Strategy for a classified request.
pub fn select(classification: Classification) -> Strategy {
    if classification.critical {
        return Strategy::CacheFirstWithUpdate;
    }
    match classification.class {
        ResourceClass::Static => Strategy::CacheFirstWithUpdate,
        ResourceClass::Image => Strategy::CacheFirstWithCleanup,
        class @ (ResourceClass::Api | ResourceClass::Business | ResourceClass::Dynamic) => {
            Strategy::NetworkFirst(class.partition())
        }
    }
}

impl CacheEngine {
    /// Classify `url`, run the matching strategy and return its response.
    pub async fn respond(&self, url: &Url, navigate: bool) -> SiteResponse {
        let classification = self.classifier().classify(url.path());
        let kind = FallbackKind::for_request(url, navigate, classification.class);

        match select(classification) {
            Strategy::CacheFirstWithUpdate => {
                self.cache_first_with_update(url, classification.class.partition(), kind).await
            }
            Strategy::NetworkFirst(partition) => self.network_first(url, partition, kind).await,
            Strategy::CacheFirstWithCleanup => self.cache_first_with_cleanup(url).await,
        }
    }
}
