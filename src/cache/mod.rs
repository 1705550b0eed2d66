//! Bounded result cache with TTL, backed by moka
//!
//! Owned by whoever builds the search engine and injected into it; there is no
//! process-wide cache. Entries are keyed by [`cache_key`] and expire after the
//! configured TTL. Capacity eviction follows moka's TinyLFU policy.

use moka::sync::Cache;
use std::time::Duration;

pub struct QueryCache<V: Clone + Send + Sync + 'static> {
    cache: Option<Cache<String, V>>,
}

/// Stable cache key: BLAKE3 over the given parts
pub fn cache_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0x1f]);
    }
    hasher.finalize().to_hex().to_string()
}

impl<V: Clone + Send + Sync + 'static> QueryCache<V> {
    /// A zero `max_entries` yields a cache that stores nothing
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let cache = (max_entries > 0).then(|| {
            Cache::builder()
                .max_capacity(max_entries as u64)
                .time_to_live(ttl)
                .build()
        });
        Self { cache }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.as_ref()?.get(key)
    }

    pub fn insert(&self, key: String, value: V) {
        if let Some(cache) = &self.cache {
            cache.insert(key, value);
        }
    }

    /// Live entry count after pending evictions and expirations are applied
    pub fn len(&self) -> usize {
        match &self.cache {
            Some(cache) => {
                cache.run_pending_tasks();
                cache.entry_count() as usize
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_separated() {
        let a = cache_key(["ab", "c"]);
        let b = cache_key(["ab", "c"]);
        let c = cache_key(["a", "bc"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_get_and_insert() {
        let cache = QueryCache::new(4, Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        cache.insert("k".to_string(), 7);
        assert_eq!(cache.get("k"), Some(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = QueryCache::new(2, Duration::from_secs(60));
        for i in 0..10 {
            cache.insert(format!("k{}", i), i);
        }
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = QueryCache::new(4, Duration::from_millis(10));
        cache.insert("k".to_string(), 1);
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_clear() {
        let cache = QueryCache::new(4, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        cache.clear();
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = QueryCache::new(0, Duration::from_secs(60));
        cache.insert("k".to_string(), 1);
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }
}
