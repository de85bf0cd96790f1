//! Access Tracking Module
//!
//! Per-key access statistics kept apart from the stored values, fed to the
//! smart-eviction analysis.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// == Access Pattern ==
/// How often and how recently a key has been touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPattern {
    pub key: String,
    pub access_count: u64,
    /// Unix milliseconds of the latest access
    pub last_access_at: u64,
    /// Running mean of the gap between accesses, 0 until a second access
    pub avg_interval_millis: f64,
}

impl AccessPattern {
    fn first(key: &str, now_ms: u64) -> Self {
        Self {
            key: key.to_string(),
            access_count: 1,
            last_access_at: now_ms,
            avg_interval_millis: 0.0,
        }
    }

    fn touch(&mut self, now_ms: u64) {
        let interval = now_ms.saturating_sub(self.last_access_at) as f64;
        // Mean over the `access_count` gaps seen after this access
        let gaps = self.access_count as f64;
        self.avg_interval_millis = (self.avg_interval_millis * (gaps - 1.0) + interval) / gaps;
        self.access_count += 1;
        self.last_access_at = self.last_access_at.max(now_ms);
    }
}

// == Access Tracker ==
/// Owned table of access patterns.
///
/// Shared by handle (`Arc<AccessTracker>`) between the controllers that record
/// accesses and the maintenance pass that reads them. Starts empty on every
/// process start.
#[derive(Debug, Default)]
pub struct AccessTracker {
    patterns: Mutex<HashMap<String, AccessPattern>>,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Access ==
    /// Records a read or write of `key` at `now_ms`.
    pub fn record_access(&self, key: &str, now_ms: u64) {
        let mut patterns = self.patterns.lock();
        match patterns.get_mut(key) {
            Some(pattern) => pattern.touch(now_ms),
            None => {
                patterns.insert(key.to_string(), AccessPattern::first(key, now_ms));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<AccessPattern> {
        self.patterns.lock().get(key).cloned()
    }

    /// Forgets `key`, e.g. after it was evicted.
    pub fn remove(&self, key: &str) {
        self.patterns.lock().remove(key);
    }

    /// Copies every pattern out of the table.
    pub fn snapshot(&self) -> Vec<AccessPattern> {
        self.patterns.lock().values().cloned().collect()
    }

    /// Keeps only the keys for which `keep` returns true.
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.patterns.lock().retain(|key, _| keep(key));
    }

    pub fn clear(&self) {
        self.patterns.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.patterns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.lock().is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_access() {
        let tracker = AccessTracker::new();
        tracker.record_access("a", 1_000);

        let pattern = tracker.get("a").unwrap();
        assert_eq!(pattern.access_count, 1);
        assert_eq!(pattern.last_access_at, 1_000);
        assert_eq!(pattern.avg_interval_millis, 0.0);
    }

    #[test]
    fn test_average_interval() {
        let tracker = AccessTracker::new();
        tracker.record_access("a", 0);
        tracker.record_access("a", 100);
        tracker.record_access("a", 400);

        // Gaps of 100 and 300
        let pattern = tracker.get("a").unwrap();
        assert_eq!(pattern.access_count, 3);
        assert_eq!(pattern.last_access_at, 400);
        assert_eq!(pattern.avg_interval_millis, 200.0);
    }

    #[test]
    fn test_out_of_order_access_does_not_rewind() {
        let tracker = AccessTracker::new();
        tracker.record_access("a", 500);
        tracker.record_access("a", 100);

        let pattern = tracker.get("a").unwrap();
        assert_eq!(pattern.last_access_at, 500);
        assert_eq!(pattern.avg_interval_millis, 0.0);
    }

    #[test]
    fn test_remove_and_clear() {
        let tracker = AccessTracker::new();
        tracker.record_access("a", 0);
        tracker.record_access("b", 0);

        tracker.remove("a");
        assert!(tracker.get("a").is_none());
        assert_eq!(tracker.len(), 1);

        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_retain() {
        let tracker = AccessTracker::new();
        tracker.record_access("keep", 0);
        tracker.record_access("drop", 0);

        tracker.retain(|key| key == "keep");
        assert!(tracker.get("keep").is_some());
        assert!(tracker.get("drop").is_none());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let tracker = AccessTracker::new();
        tracker.record_access("k", 42);

        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json[0]["accessCount"], 1);
        assert_eq!(json[0]["lastAccessAt"], 42);
        assert_eq!(json[0]["avgIntervalMillis"], 0.0);
    }
}
