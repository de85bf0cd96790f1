//! Cache Store Module
//!
//! The persistent store contract the controller and maintenance depend on,
//! plus an in-memory implementation with JSON snapshot persistence.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, info};

use crate::cache::{Arbitrary, CacheEntry, CacheStats, Clock, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Persistent Store Contract ==
/// Synchronous key/value store holding cache entries.
///
/// Every `set` replaces the whole entry for a key; readers never observe a
/// partial write.
pub trait PersistentStore: Send + Sync {
    /// Returns the live entry for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Writes a fresh entry for `key`, replacing any previous one.
    fn set(&self, key: &str, value: Arbitrary, ttl_millis: u64) -> Result<()>;

    /// Removes `key`. Returns whether an entry was present.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Removes `key` on behalf of the eviction pass.
    fn evict(&self, key: &str) -> Result<bool> {
        self.delete(key)
    }

    /// Snapshot of every live entry.
    fn entries(&self) -> Result<Vec<CacheEntry>>;

    /// Drops every expired entry. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize>;
}

// == Memory Store ==
/// In-memory store with lazy expiry on read.
#[derive(Debug)]
pub struct MemoryStore {
    /// Key-value storage
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Performance statistics
    stats: Mutex<CacheStats>,
    /// Time source for TTL checks
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: Mutex::new(CacheStats::new()),
            clock,
        }
    }

    // == Stats ==
    /// Returns current store statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.set_total_entries(self.len());
        stats
    }

    /// Returns the number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    // == Snapshots ==
    /// Writes every live entry to `path` as one JSON document.
    ///
    /// The file is written next to `path` first and then renamed over it.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize> {
        let entries = self.entries()?;
        let body = serde_json::to_string(&entries)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;

        info!(count = entries.len(), path = %path.display(), "Snapshot saved");
        Ok(entries.len())
    }

    /// Builds a store from a snapshot written by [`MemoryStore::save_snapshot`].
    ///
    /// Entries that expired while the snapshot sat on disk are dropped.
    pub fn load_snapshot(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let body = fs::read_to_string(path)?;
        let entries: Vec<CacheEntry> = serde_json::from_str(&body)
            .map_err(|e| CacheError::Deserialization(e.to_string()))?;

        let now = clock.now_ms();
        let total = entries.len();
        let live: HashMap<String, CacheEntry> = entries
            .into_iter()
            .filter(|entry| entry.is_live_at(now))
            .map(|entry| (entry.key.clone(), entry))
            .collect();

        info!(
            loaded = live.len(),
            dropped = total - live.len(),
            path = %path.display(),
            "Snapshot loaded"
        );

        let store = Self::new(clock);
        *store.entries.write() = live;
        Ok(store)
    }
}

impl PersistentStore for MemoryStore {
    // == Get ==
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = self.clock.now_ms();
        let guard = self.entries.upgradable_read();
        let found = guard
            .get(key)
            .map(|entry| entry.is_live_at(now).then(|| entry.clone()));

        match found {
            Some(Some(entry)) => {
                drop(guard);
                self.stats.lock().record_hit();
                Ok(Some(entry))
            }
            Some(None) => {
                let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
                guard.remove(key);
                drop(guard);

                let mut stats = self.stats.lock();
                stats.record_miss();
                stats.record_expirations(1);
                debug!(key, "Expired entry dropped on read");
                Ok(None)
            }
            None => {
                drop(guard);
                self.stats.lock().record_miss();
                Ok(None)
            }
        }
    }

    // == Set ==
    fn set(&self, key: &str, value: Arbitrary, ttl_millis: u64) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let entry = CacheEntry::new(key, value, ttl_millis, self.clock.now_ms());
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    // == Delete ==
    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn evict(&self, key: &str) -> Result<bool> {
        let removed = self.delete(key)?;
        if removed {
            self.stats.lock().record_eviction();
        }
        Ok(removed)
    }

    fn entries(&self) -> Result<Vec<CacheEntry>> {
        let now = self.clock.now_ms();
        Ok(self
            .entries
            .read()
            .values()
            .filter(|entry| entry.is_live_at(now))
            .cloned()
            .collect())
    }

    // == Purge Expired ==
    fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut guard = self.entries.write();
        let before = guard.len();
        guard.retain(|_, entry| entry.is_live_at(now));
        let removed = before - guard.len();
        drop(guard);

        self.stats.lock().record_expirations(removed as u64);
        Ok(removed)
    }
}
