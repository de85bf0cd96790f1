//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{Arbitrary, CacheEntry, CacheStats};

/// Response body for entry inspection (GET /entries/:key)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub key: String,
    /// The stored value, in tagged form
    pub value: Arbitrary,
    pub created_at: u64,
    pub expires_at: u64,
    /// Milliseconds until the entry expires
    pub ttl_remaining_ms: u64,
}

impl EntryResponse {
    pub fn new(entry: CacheEntry, now_ms: u64) -> Self {
        Self {
            ttl_remaining_ms: entry.ttl_remaining_ms(now_ms),
            key: entry.key,
            value: entry.value,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
        }
    }
}

/// Response body for seeding an entry (PUT /entries)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResponse {
    /// Success message
    pub message: String,
    pub key: String,
    /// TTL actually applied, in milliseconds
    pub ttl_ms: u64,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, ttl_ms: u64) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            ttl_ms,
        }
    }
}

/// Response body for the DELETE operation (DELETE /entries/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Keys with a recorded access pattern
    pub tracked_keys: usize,
    /// Worker requests still waiting for a response
    pub pending_worker_requests: usize,
}

impl StatsResponse {
    pub fn new(stats: &CacheStats, tracked_keys: usize, pending_worker_requests: usize) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            expirations: stats.expirations,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
            tracked_keys,
            pending_worker_requests,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_response_serialize() {
        let entry = CacheEntry::new("k", Arbitrary::from("v"), 1_000, 5_000);
        let resp = EntryResponse::new(entry, 5_400);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["key"], "k");
        assert_eq!(json["value"], "v");
        assert_eq!(json["expiresAt"], 6_000);
        assert_eq!(json["ttlRemainingMs"], 600);
    }

    #[test]
    fn test_set_response_serialize() {
        let resp = SetResponse::new("my_key", 60_000);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("my_key"));
        assert!(json.contains("successfully"));
        assert!(json.contains("\"ttlMs\":60000"));
    }

    #[test]
    fn test_delete_response_serialize() {
        let resp = DeleteResponse::new("deleted_key");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("deleted_key"));
        assert!(json.contains("deleted"));
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let mut stats = CacheStats::new();
        for _ in 0..8 {
            stats.record_hit();
        }
        for _ in 0..2 {
            stats.record_miss();
        }
        let resp = StatsResponse::new(&stats, 3, 0);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.tracked_keys, 3);
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::new(&CacheStats::new(), 0, 0);
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
