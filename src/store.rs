use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use crate::entry::CachedEntry;

/// The narrow key/entry map the coordinator consumes. Last write wins;
/// eviction and expiry policy belong to the implementation.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>>;
    async fn put(&self, key: &str, entry: CachedEntry) -> Result<()>;
}

#[derive(Debug)]
struct StoredEntry {
    entry: CachedEntry,
    expires_at: Instant,
}

/// Bundled in-memory store: LRU bounded by entry count with a per-store
/// TTL. Expired entries drop out on read. Production hosts typically
/// supply their own `CacheStore` instead.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, StoredEntry>>,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(max_entries: usize, ttl: Duration) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_entries)
            .ok_or_else(|| anyhow!("store capacity must be greater than zero"))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>> {
        let mut guard = self.entries.lock();
        let expired = match guard.get(key) {
            Some(stored) => Instant::now() > stored.expires_at,
            None => return Ok(None),
        };
        if expired {
            guard.pop(key);
            return Ok(None);
        }
        Ok(guard.get(key).map(|stored| stored.entry.clone()))
    }

    async fn put(&self, key: &str, entry: CachedEntry) -> Result<()> {
        let stored = StoredEntry {
            entry,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().put(key.to_string(), stored);
        Ok(())
    }
}
