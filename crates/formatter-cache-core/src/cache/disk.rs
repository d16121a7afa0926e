use sled::Db;
use std::path::Path;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::key::Key;
use crate::error::{Error, Result};

/// Disk tier using sled. Survives restarts; freshness is re-checked by the
/// validator on every read, so stale entries are harmless.
pub struct DiskStore {
    db: Db,
}

impl DiskStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::CacheInit(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = sled::open(path).map_err(|e| {
            let err_str = e.to_string();
            // Detect lock errors and provide actionable fix
            if err_str.contains("WouldBlock") || err_str.contains("lock") {
                Error::CacheInit(format!(
                    "Cache locked at {}\n\n\
                    Another process is using the cache, or a previous instance crashed.\n\
                    To fix: rm {}/db/LOCK",
                    path.display(),
                    path.display()
                ))
            } else {
                Error::CacheInit(format!("Failed to open cache at {}: {}", path.display(), e))
            }
        })?;

        debug!("Opened disk cache at {}", path.display());

        Ok(Self { db })
    }

    pub fn get(&self, key: &Key) -> Option<CacheEntry> {
        match self.db.get(key.storage_key().as_bytes()) {
            Ok(Some(value)) => match CacheEntry::decode(&value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Discarding unreadable cache entry for {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read error: {}", e);
                None
            }
        }
    }

    pub fn insert(&self, key: &Key, entry: &CacheEntry) -> Result<()> {
        self.db
            .insert(key.storage_key().as_bytes(), entry.encode())
            .map_err(|e| Error::CacheWrite(e.to_string()))?;

        // Flush to ensure persistence
        self.db
            .flush()
            .map_err(|e| Error::CacheWrite(format!("Flush failed: {e}")))?;

        Ok(())
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.db
            .contains_key(key.storage_key().as_bytes())
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &Key) -> Result<()> {
        self.db
            .remove(key.storage_key().as_bytes())
            .map_err(|e| Error::CacheWrite(e.to_string()))?;
        Ok(())
    }

    /// Remove every variant of a record. Returns how many entries were removed.
    pub fn remove_record(&self, record_id: u64) -> Result<usize> {
        let prefix = Key::record_prefix(record_id);
        let mut removed = 0;

        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (storage_key, _) = item.map_err(|e| Error::CacheRead(e.to_string()))?;
            self.db
                .remove(storage_key)
                .map_err(|e| Error::CacheWrite(e.to_string()))?;
            removed += 1;
        }

        self.db
            .flush()
            .map_err(|e| Error::CacheWrite(format!("Flush failed: {e}")))?;

        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.db.clear().map_err(|e| Error::CacheWrite(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| Error::CacheWrite(format!("Flush failed: {e}")))?;
        Ok(())
    }

    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}
