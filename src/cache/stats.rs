//! Cache Statistics Module
//!
//! Tracks store performance metrics including hits, misses, expirations and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks store performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of reads that found a live entry
    pub hits: u64,
    /// Number of reads that found nothing live (absent or expired)
    pub misses: u64,
    /// Number of entries dropped because their TTL elapsed
    pub expirations: u64,
    /// Number of entries removed by the smart-eviction pass
    pub evictions: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expirations(&mut self, count: u64) {
        self.expirations += count;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
