//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::Arbitrary;

// == Cache Entry ==
/// A stored value with its expiry window.
///
/// Timestamps are fixed at creation; a refresh writes a brand new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub key: String,
    /// The stored value
    pub value: Arbitrary,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Time to live in milliseconds
    pub ttl_millis: u64,
    /// Expiration timestamp (Unix milliseconds), always `created_at + ttl_millis`
    pub expires_at: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry written at `now_ms`.
    ///
    /// # Arguments
    /// * `key` - The key the entry belongs to
    /// * `value` - The value to store
    /// * `ttl_millis` - Time to live in milliseconds
    /// * `now_ms` - Creation time
    pub fn new(key: impl Into<String>, value: Arbitrary, ttl_millis: u64, now_ms: u64) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: now_ms,
            ttl_millis,
            expires_at: now_ms.saturating_add(ttl_millis),
        }
    }

    // == Is Live ==
    /// Checks if the entry is still live at `now_ms`.
    ///
    /// Boundary condition: an entry is live strictly before `expires_at` and
    /// expired from `expires_at` on.
    pub fn is_live_at(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at
    }

    /// Inverse of [`CacheEntry::is_live_at`].
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        !self.is_live_at(now_ms)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds at `now_ms`, 0 once expired.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at.saturating_sub(now_ms)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
