//! Bounded, expiring cache of discovery outcomes keyed by input URL.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    /// Accepted avatar URL, or `None` for a rejected lookup.
    value: Option<String>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Outcomes are cached whether or not a photo was found, so a rejected URL
/// does not trigger another scrape until its entry expires.
///
/// Entries are write-once: inserting over a live entry is ignored.
#[derive(Debug)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// `Some(outcome)` for a live entry, `None` when unseen or expired.
    pub async fn get(&self, key: &str) -> Option<Option<String>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        entry.is_live(Instant::now()).then(|| entry.value.clone())
    }

    /// Store an outcome. Returns whether anything was written.
    pub async fn insert(&self, key: impl Into<String>, value: Option<String>) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let key = key.into();
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match entries.get(&key).map(|e| e.is_live(now)) {
            Some(true) => return false,
            Some(false) => {}
            None if entries.len() >= self.capacity => {
                entries.retain(|_, e| e.is_live(now));
                if entries.len() >= self.capacity {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, e)| e.expires_at)
                        .map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        entries.remove(&oldest);
                    }
                }
            }
            None => {}
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
        true
    }

    /// Number of stored entries, expired ones included until evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stores_both_outcomes() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        assert_eq!(cache.get("https://a.test/").await, None);

        assert!(cache.insert("https://a.test/", Some("https://a.test/me.jpg".into())).await);
        assert!(cache.insert("https://b.test/", None).await);

        assert_eq!(
            cache.get("https://a.test/").await,
            Some(Some("https://a.test/me.jpg".to_string()))
        );
        assert_eq!(cache.get("https://b.test/").await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_exact_strings() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        cache.insert("https://a.test", None).await;
        assert_eq!(cache.get("https://a.test/").await, None);
        assert_eq!(cache.get("https://A.test").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn live_entries_are_not_overwritten() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        cache.insert("k", None).await;
        assert!(!cache.insert("k", Some("https://a.test/x.jpg".into())).await);
        assert_eq!(cache.get("k").await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        cache.insert("k", Some("v".into())).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").await, Some(Some("v".to_string())));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await, None);

        assert!(cache.insert("k", None).await);
        assert_eq!(cache.get("k").await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_purges_expired_first() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.insert("old", None).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.insert("mid", None).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        cache.insert("new", None).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("mid").await, Some(None));
        assert_eq!(cache.get("new").await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_soonest_to_expire() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.insert("a", None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("b", None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("c", None).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(None));
        assert_eq!(cache.get("c").await, Some(None));
    }

    #[tokio::test]
    async fn zero_capacity_stores_nothing() {
        let cache = ResultCache::new(0, DEFAULT_TTL);
        assert!(!cache.insert("k", None).await);
        assert!(cache.is_empty().await);
    }
}
