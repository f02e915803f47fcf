//! Size-bounded eviction.
//!
//! Critical resources are never evicted; among the rest the oldest
//! insertions go first.

use super::connection::CacheDb;
use super::entries::EntryAge;
use crate::Error;
use crate::classify::Classifier;

/// Pick the URLs to delete so that `entries.len() + reserve <= max_items`.
///
/// A `max_items` of zero disables enforcement. If critical entries alone
/// exceed the limit, every non-critical entry is selected and the partition
/// stays above the limit.
pub fn select_evictions(
    entries: &[EntryAge], max_items: usize, reserve: usize, is_critical: impl Fn(&str) -> bool,
) -> Vec<String> {
    if max_items == 0 {
        return Vec::new();
    }

    let target = max_items.saturating_sub(reserve);
    if entries.len() <= target {
        return Vec::new();
    }
    let excess = entries.len() - target;

    let mut candidates: Vec<&EntryAge> = entries.iter().filter(|e| !is_critical(&e.url)).collect();
    candidates.sort_by(|a, b| a.inserted_at.cmp(&b.inserted_at).then_with(|| a.url.cmp(&b.url)));

    candidates.into_iter().take(excess).map(|e| e.url.clone()).collect()
}

impl CacheDb {
    /// Evict until the partition holds at most `max_items` entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn limit_partition_size(
        &self, partition: &str, max_items: usize, classifier: &Classifier,
    ) -> Result<u64, Error> {
        self.evict(partition, max_items, 0, classifier).await
    }

    /// Evict so that one more insertion keeps the partition within `max_items`.
    pub async fn make_room(&self, partition: &str, max_items: usize, classifier: &Classifier) -> Result<u64, Error> {
        self.evict(partition, max_items, 1, classifier).await
    }

    async fn evict(&self, partition: &str, max_items: usize, reserve: usize, classifier: &Classifier) -> Result<u64, Error> {
        if max_items == 0 {
            return Ok(0);
        }

        let entries = self.keys_with_age(partition).await?;
        let victims = select_evictions(&entries, max_items, reserve, |url| classifier.is_critical_url(url));

        let mut deleted = 0u64;
        for url in &victims {
            if self.delete(partition, url).await? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            tracing::info!(partition, deleted, max_items, "evicted oldest entries");
        }

        Ok(deleted)
    }
}
