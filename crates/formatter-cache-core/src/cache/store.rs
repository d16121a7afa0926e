use tracing::warn;

use super::disk::DiskStore;
use super::entry::CacheEntry;
use super::key::Key;
use super::memory::MemoryStore;
use crate::config::CacheConfig;
use crate::error::Result;

/// Entry storage with memory and disk layers
pub struct EntryStore {
    memory: Option<MemoryStore>,
    disk: Option<DiskStore>,
}

/// Entry counts and sizes per tier
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub memory_entries: u64,
    pub memory_bytes: u64,
    pub disk_entries: u64,
    pub disk_bytes: u64,
}

impl EntryStore {
    /// Create the storage tiers from configuration
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let memory = if config.memory_enabled {
            Some(MemoryStore::new(
                config.memory_max_mb,
                config.memory_ttl_seconds,
            ))
        } else {
            None
        };

        let disk = if config.disk_enabled {
            let path = config
                .disk_path
                .clone()
                .unwrap_or_else(crate::util::formatter_cache_path);
            Some(DiskStore::new(path)?)
        } else {
            None
        };

        Ok(Self { memory, disk })
    }

    /// Look up an entry, memory first
    pub async fn get(&self, key: &Key) -> Option<CacheEntry> {
        if let Some(ref memory) = self.memory
            && let Some(entry) = memory.get(key).await
        {
            return Some(entry);
        }

        if let Some(ref disk) = self.disk
            && let Some(entry) = disk.get(key)
        {
            // Populate memory on disk hit
            if let Some(ref memory) = self.memory {
                memory.insert(key.clone(), entry.clone()).await;
            }
            return Some(entry);
        }

        None
    }

    /// Store an entry in every enabled tier, replacing any previous one
    pub async fn insert(&self, key: &Key, entry: CacheEntry) {
        if let Some(ref disk) = self.disk
            && let Err(e) = disk.insert(key, &entry)
        {
            warn!("Failed to persist {}: {}", key, e);
        }

        if let Some(ref memory) = self.memory {
            memory.insert(key.clone(), entry).await;
        }
    }

    pub async fn remove(&self, key: &Key) {
        if let Some(ref memory) = self.memory {
            memory.remove(key).await;
        }

        if let Some(ref disk) = self.disk
            && let Err(e) = disk.remove(key)
        {
            warn!("Failed to remove {} from disk: {}", key, e);
        }
    }

    /// Drop every variant of a record from all tiers
    pub fn remove_record(&self, record_id: u64) {
        if let Some(ref memory) = self.memory {
            memory.remove_record(record_id);
        }

        if let Some(ref disk) = self.disk
            && let Err(e) = disk.remove_record(record_id)
        {
            warn!("Failed to remove record {} from disk: {}", record_id, e);
        }
    }

    /// Clear all tiers
    pub fn clear(&self) {
        if let Some(ref memory) = self.memory {
            memory.clear();
        }

        if let Some(ref disk) = self.disk
            && let Err(e) = disk.clear()
        {
            warn!("Failed to clear disk cache: {}", e);
        }
    }

    pub async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();

        if let Some(ref memory) = self.memory {
            memory.sync().await;
            stats.memory_entries = memory.len();
            stats.memory_bytes = memory.weighted_size();
        }

        if let Some(ref disk) = self.disk {
            stats.disk_entries = disk.len() as u64;
            stats.disk_bytes = disk.size_on_disk();
        }

        stats
    }
}
