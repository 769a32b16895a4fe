//! In-process membership cache with per-entry TTL and LRU eviction

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{KeyPattern, MembershipCache};
use crate::error::{RapportError, Result};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// LRU-bounded cache shared across requests
pub struct InMemoryCache {
    cache: RwLock<LruCache<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Entries currently held, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn poisoned() -> RapportError {
        RapportError::DataAccess("cache lock poisoned".to_string())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl MembershipCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut cache = self.cache.write().map_err(|_| Self::poisoned())?;
        let lookup = cache
            .get(key)
            .map(|entry| entry.is_valid().then(|| entry.value.clone()));
        match lookup {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                cache.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut cache = self.cache.write().map_err(|_| Self::poisoned())?;
        cache.put(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::new(pattern)?;
        let mut cache = self.cache.write().map_err(|_| Self::poisoned())?;
        let doomed: Vec<String> = cache
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            cache.pop(key);
        }
        debug!(evicted = doomed.len(), "Deleted matching cache entries");
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let cache = InMemoryCache::new(8);
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = InMemoryCache::new(8);
        cache
            .set("k", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let cache = InMemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set("a", vec![1], ttl).await.unwrap();
        cache.set("b", vec![2], ttl).await.unwrap();
        cache.get("a").await.unwrap();
        cache.set("c", vec![3], ttl).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_matching() {
        let cache = InMemoryCache::new(16);
        let ttl = Duration::from_secs(60);
        cache.set("smart_group:u1:g1:members", vec![1], ttl).await.unwrap();
        cache.set("smart_group:u1:g2:members", vec![2], ttl).await.unwrap();
        cache.set("smart_group:u2:g3:members", vec![3], ttl).await.unwrap();

        let evicted = cache.delete_matching("smart_group:u1:*").await.unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache
            .get("smart_group:u2:g3:members")
            .await
            .unwrap()
            .is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
