use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cache key for the rendered home feed. The page number is deliberately not
/// part of the key: every request within the TTL window sees the same body.
pub const INDEX_CACHE_KEY: &str = "index_page";

/// Time-boxed cache for rendered feed pages.
///
/// Entries expire after the configured TTL; `clear` drops everything
/// immediately. The cache is held in `AppState` behind a mutex so concurrent
/// requests within the validity window observe the same payload.
pub struct FeedCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

struct CacheEntry {
    stored_at: Instant,
    body: String,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached body for `key` if it has not expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry.body.clone())
        } else {
            None
        }
    }

    pub fn set(&mut self, key: &str, body: String) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                stored_at: Instant::now(),
                body,
            },
        );
    }

    /// Drop all cached entries. The next request re-renders.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_what_was_set() {
        let mut cache = FeedCache::new(Duration::from_secs(20));
        cache.set(INDEX_CACHE_KEY, "<html>feed</html>".to_string());
        assert_eq!(
            cache.get(INDEX_CACHE_KEY),
            Some("<html>feed</html>".to_string())
        );
    }

    #[test]
    fn get_misses_on_unknown_key() {
        let cache = FeedCache::new(Duration::from_secs(20));
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = FeedCache::new(Duration::from_millis(10));
        cache.set(INDEX_CACHE_KEY, "stale".to_string());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(INDEX_CACHE_KEY), None);
    }

    #[test]
    fn set_refreshes_existing_entry() {
        let mut cache = FeedCache::new(Duration::from_secs(20));
        cache.set(INDEX_CACHE_KEY, "old".to_string());
        cache.set(INDEX_CACHE_KEY, "new".to_string());
        assert_eq!(cache.get(INDEX_CACHE_KEY), Some("new".to_string()));
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache = FeedCache::new(Duration::from_secs(20));
        cache.set(INDEX_CACHE_KEY, "body".to_string());
        cache.clear();
        assert_eq!(cache.get(INDEX_CACHE_KEY), None);
    }
}
