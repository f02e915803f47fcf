//! In-memory freshness tracking.
//!
//! Records when each URL was last fetched from the network, per partition,
//! and answers whether a cached copy is still inside its TTL. State lives
//! only as long as the worker instance: after a restart every URL is stale
//! until traffic repopulates it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::Partition;
use crate::clock::Clock;
use crate::config::AppConfig;

/// Last-fetch timestamps keyed by partition, then URL.
#[derive(Clone)]
pub struct FreshnessTracker {
    records: Arc<RwLock<HashMap<Partition, HashMap<String, i64>>>>,
    ttl_ms: Arc<HashMap<Partition, i64>>,
    clock: Arc<dyn Clock>,
}

impl FreshnessTracker {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl_ms = Partition::ALL
            .iter()
            .map(|p| (*p, i64::try_from(config.ttl_for(*p).as_millis()).unwrap_or(i64::MAX)))
            .collect();
        Self { records: Arc::new(RwLock::new(HashMap::new())), ttl_ms: Arc::new(ttl_ms), clock }
    }

    /// Store `now` as the last fetch time of `url`.
    pub async fn record_fetch(&self, url: &str, partition: Partition) {
        let now = self.clock.now_ms();
        let mut records = self.records.write().await;
        records.entry(partition).or_default().insert(url.to_string(), now);
    }

    /// True iff `now - recorded < ttl`. Unknown URLs are stale.
    pub async fn is_fresh(&self, url: &str, partition: Partition) -> bool {
        let Some(recorded) = self.last_fetch(url, partition).await else {
            return false;
        };
        let ttl = self.ttl_ms.get(&partition).copied().unwrap_or(0);
        let fresh = self.clock.now_ms().saturating_sub(recorded) < ttl;
        if !fresh {
            tracing::debug!(url, %partition, "cache entry expired");
        }
        fresh
    }

    pub async fn last_fetch(&self, url: &str, partition: Partition) -> Option<i64> {
        let records = self.records.read().await;
        records.get(&partition).and_then(|m| m.get(url)).copied()
    }

    /// URLs of a partition whose record is past the TTL (`recorded + ttl < now`).
    pub async fn expired(&self, partition: Partition) -> Vec<String> {
        let now = self.clock.now_ms();
        let ttl = self.ttl_ms.get(&partition).copied().unwrap_or(0);
        let records = self.records.read().await;
        records
            .get(&partition)
            .map(|m| {
                m.iter()
                    .filter(|(_, recorded)| recorded.saturating_add(ttl) < now)
                    .map(|(url, _)| url.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn forget(&self, url: &str, partition: Partition) {
        let mut records = self.records.write().await;
        if let Some(m) = records.get_mut(&partition) {
            m.remove(url);
        }
    }

    /// Drop every record of a partition.
    pub async fn clear(&self, partition: Partition) {
        let mut records = self.records.write().await;
        records.remove(&partition);
    }

    /// Copy of all records, for status reporting.
    pub async fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, i64>> {
        let records = self.records.read().await;
        records
            .iter()
            .map(|(p, m)| (p.to_string(), m.iter().map(|(u, t)| (u.clone(), *t)).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TtlConfig;

    fn tracker(ttl: TtlConfig) -> (FreshnessTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = AppConfig { ttl, ..Default::default() };
        (FreshnessTracker::new(&config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_absent_is_stale() {
        let (t, _) = tracker(TtlConfig::default());
        assert!(!t.is_fresh("https://e.com/api/x", Partition::Api).await);
    }

    #[tokio::test]
    async fn test_fresh_within_ttl() {
        let (t, clock) = tracker(TtlConfig::default());
        let url = "https://e.com/castelar/data/farmacias.json";
        t.record_fetch(url, Partition::Business).await;

        clock.advance_ms(60_000);
        assert!(t.is_fresh(url, Partition::Business).await);

        clock.advance_ms(10 * 60_000);
        assert!(!t.is_fresh(url, Partition::Business).await);
    }

    #[tokio::test]
    async fn test_exact_ttl_boundary_is_stale() {
        let (t, clock) = tracker(TtlConfig { api_ms: 120_000, ..Default::default() });
        t.record_fetch("u", Partition::Api).await;
        clock.advance_ms(119_999);
        assert!(t.is_fresh("u", Partition::Api).await);
        clock.advance_ms(1);
        assert!(!t.is_fresh("u", Partition::Api).await);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_stale() {
        let (t, _) = tracker(TtlConfig { dynamic_ms: 0, ..Default::default() });
        t.record_fetch("u", Partition::Dynamic).await;
        assert!(!t.is_fresh("u", Partition::Dynamic).await);
    }

    #[tokio::test]
    async fn test_partitions_are_separate() {
        let (t, _) = tracker(TtlConfig::default());
        t.record_fetch("u", Partition::Api).await;
        assert!(t.is_fresh("u", Partition::Api).await);
        assert!(!t.is_fresh("u", Partition::Business).await);
    }

    #[tokio::test]
    async fn test_expired_clear_and_snapshot() {
        let (t, clock) = tracker(TtlConfig::default());
        t.record_fetch("old", Partition::Api).await;
        clock.advance_ms(200_000);
        t.record_fetch("new", Partition::Api).await;

        assert_eq!(t.expired(Partition::Api).await, vec!["old".to_string()]);

        let snap = t.snapshot().await;
        assert_eq!(snap["api"].len(), 2);

        t.forget("old", Partition::Api).await;
        assert!(t.last_fetch("old", Partition::Api).await.is_none());

        t.clear(Partition::Api).await;
        assert!(t.snapshot().await.get("api").is_none());
    }
}
