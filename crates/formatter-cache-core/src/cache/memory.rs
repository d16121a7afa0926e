use moka::future::Cache;
use std::time::Duration;
use tracing::warn;

use super::entry::CacheEntry;
use super::key::Key;

/// In-memory tier using moka with byte-size-based eviction.
pub struct MemoryStore {
    cache: Cache<Key, CacheEntry>,
}

impl MemoryStore {
    pub fn new(max_mb: u64, ttl_seconds: u64) -> Self {
        let max_bytes = max_mb.saturating_mul(1024 * 1024);

        let mut builder = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &Key, entry: &CacheEntry| -> u32 { entry.weight() })
            .support_invalidation_closures();

        if ttl_seconds > 0 {
            builder = builder.time_to_live(Duration::from_secs(ttl_seconds));
        }

        Self {
            cache: builder.build(),
        }
    }

    pub async fn get(&self, key: &Key) -> Option<CacheEntry> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: Key, entry: CacheEntry) {
        self.cache.insert(key, entry).await;
    }

    pub async fn remove(&self, key: &Key) {
        self.cache.invalidate(key).await;
    }

    pub fn remove_record(&self, record_id: u64) {
        if let Err(e) = self
            .cache
            .invalidate_entries_if(move |key, _| key.record_id == record_id)
        {
            warn!("Failed to invalidate memory entries of record {}: {}", record_id, e);
        }
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Apply pending evictions and invalidations so counts are exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }
}
