// Copyright 2025 Cowboy AI, LLC.

//! Write-through blacklist cache
//!
//! The domain table is the source of truth; this cache is a derived view
//! keyed by `blacklist:<host>` with a TTL and LRU eviction. Mutations that
//! affect blacklist state go through this facade so invalidation stays
//! explicit, and a disabled cache degrades every read to a direct store
//! query - availability never depends on the cache.

use crate::errors::DiscoveryResult;
use crate::store::DomainStore;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Cache capacity and TTL
#[derive(Debug, Clone)]
pub struct BlacklistCacheConfig {
    /// Maximum cached hosts before LRU eviction
    pub capacity: usize,
    /// How long a cached answer stays valid
    pub ttl: Duration,
}

impl Default for BlacklistCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Hit/miss counters, exported on the health surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the cache
    pub hits: u64,
    /// Reads that fell through to the store
    pub misses: u64,
}

struct CachedEntry {
    blacklisted: bool,
    cached_at: Instant,
}

/// Write-through cache over [`DomainStore::is_blacklisted`]
pub struct BlacklistCache {
    store: Arc<dyn DomainStore>,
    entries: Mutex<LruCache<String, CachedEntry>>,
    ttl: Duration,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlacklistCache {
    /// Build a cache over the authoritative store
    pub fn new(store: Arc<dyn DomainStore>, config: BlacklistCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: config.ttl,
            enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn cache_key(host: &str) -> String {
        format!("blacklist:{host}")
    }

    /// Whether the host is blacklisted, consulting the cache first
    pub async fn is_blacklisted(&self, host: &str) -> DiscoveryResult<bool> {
        if self.enabled.load(Ordering::Relaxed) {
            let key = Self::cache_key(host);
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&key) {
                if entry.cached_at.elapsed() < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.blacklisted);
                }
                entries.pop(&key);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let blacklisted = self.store.is_blacklisted(host).await?;

        if self.enabled.load(Ordering::Relaxed) {
            let mut entries = self.entries.lock().await;
            entries.put(
                Self::cache_key(host),
                CachedEntry {
                    blacklisted,
                    cached_at: Instant::now(),
                },
            );
        }
        Ok(blacklisted)
    }

    /// Blacklist a host, writing through and refreshing the cache entry
    pub async fn blacklist(&self, host: &str, reason: &str, actor: &str) -> DiscoveryResult<()> {
        self.store.blacklist_domain(host, reason, actor).await?;
        self.refresh(host, true).await;
        Ok(())
    }

    /// Lift a blacklist, writing through and refreshing the cache entry
    pub async fn unblacklist(&self, host: &str, actor: &str) -> DiscoveryResult<()> {
        self.store.unblacklist_domain(host, actor).await?;
        self.refresh(host, false).await;
        Ok(())
    }

    async fn refresh(&self, host: &str, blacklisted: bool) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        let mut entries = self.entries.lock().await;
        entries.put(
            Self::cache_key(host),
            CachedEntry {
                blacklisted,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop one host's cached answer
    pub async fn invalidate(&self, host: &str) {
        let mut entries = self.entries.lock().await;
        entries.pop(&Self::cache_key(host));
        debug!(host, "blacklist cache entry invalidated");
    }

    /// Drop every cached answer
    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
        debug!("blacklist cache cleared");
    }

    /// Disable the cache; reads go straight to the store
    pub fn set_enabled(&self, enabled: bool) {
        if !enabled {
            warn!("blacklist cache disabled, reads bypass to the store");
        }
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Current hit/miss counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::SessionId;
    use crate::store::{DomainStore, MemoryStore};

    fn cache_over(store: &MemoryStore) -> BlacklistCache {
        BlacklistCache::new(
            Arc::new(store.clone()),
            BlacklistCacheConfig {
                capacity: 4,
                ttl: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = MemoryStore::new();
        store
            .blacklist_domain("casinowinners.com", "gambling", "ops")
            .await
            .unwrap();
        let cache = cache_over(&store);

        assert!(cache.is_blacklisted("casinowinners.com").await.unwrap());
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 1 });

        assert!(cache.is_blacklisted("casinowinners.com").await.unwrap());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_write_through_blacklist() {
        let store = MemoryStore::new();
        store
            .register_or_get("example.org", SessionId::new())
            .await
            .unwrap();
        let cache = cache_over(&store);

        assert!(!cache.is_blacklisted("example.org").await.unwrap());
        cache.blacklist("example.org", "spam", "ops").await.unwrap();

        // Cached answer reflects the mutation immediately.
        assert!(cache.is_blacklisted("example.org").await.unwrap());
        assert_eq!(cache.stats().misses, 1);

        cache.unblacklist("example.org", "ops").await.unwrap();
        assert!(!cache.is_blacklisted("example.org").await.unwrap());
        // The store agrees.
        assert!(!store.is_blacklisted("example.org").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_forces_store_read() {
        let store = MemoryStore::new();
        let cache = cache_over(&store);

        assert!(!cache.is_blacklisted("example.org").await.unwrap());
        cache.invalidate("example.org").await;

        // Mutate the store behind the cache's back.
        store
            .blacklist_domain("example.org", "spam", "ops")
            .await
            .unwrap();
        assert!(cache.is_blacklisted("example.org").await.unwrap());
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_bypasses() {
        let store = MemoryStore::new();
        let cache = cache_over(&store);
        cache.set_enabled(false);

        assert!(!cache.is_blacklisted("example.org").await.unwrap());
        store
            .blacklist_domain("example.org", "spam", "ops")
            .await
            .unwrap();
        // No stale cached answer: every read goes to the store.
        assert!(cache.is_blacklisted("example.org").await.unwrap());
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = MemoryStore::new();
        let cache = cache_over(&store);

        for host in ["a.org", "b.org", "c.org", "d.org", "e.org"] {
            cache.is_blacklisted(host).await.unwrap();
        }
        // Capacity 4: "a.org" was evicted, so reading it misses again.
        cache.is_blacklisted("a.org").await.unwrap();
        assert_eq!(cache.stats().misses, 6);
    }
}
