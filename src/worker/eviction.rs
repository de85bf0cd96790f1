//! Smart Eviction Module
//!
//! Ranks entries for removal by a blend of recency, frequency, size and
//! access interval instead of a single heuristic.
//!
//! Changing any weight or saturation point below changes which entries get
//! evicted; treat it as a policy change.

use std::collections::HashMap;

use crate::cache::AccessPattern;
use crate::error::Result;
use crate::worker::memory::item_size;
use crate::worker::protocol::{EvictionCandidate, EvictionRequest};

// == Policy Constants ==
const TIME_WEIGHT: f64 = 0.4;
const ACCESS_WEIGHT: f64 = 0.3;
const SIZE_WEIGHT: f64 = 0.2;
const INTERVAL_WEIGHT: f64 = 0.1;

/// Recency term saturates after one day
const TIME_SATURATION_MS: f64 = 86_400_000.0;
/// Frequency term reaches zero at 100 accesses
const ACCESS_SATURATION: f64 = 100.0;
/// Size term saturates at 1 MiB
const SIZE_SATURATION_BYTES: f64 = 1_048_576.0;
/// Interval term saturates at one hour
const INTERVAL_SATURATION_MS: f64 = 3_600_000.0;
/// Interval term when no interval has been observed yet
const UNKNOWN_INTERVAL_WEIGHT: f64 = 0.5;

// == Score ==
/// Blended eviction score; higher means evict sooner.
pub fn eviction_score(
    time_since_last_access_ms: u64,
    access_count: u64,
    size_bytes: u64,
    avg_interval_ms: f64,
) -> f64 {
    let time_weight = (time_since_last_access_ms as f64 / TIME_SATURATION_MS).min(1.0);
    let access_weight = (1.0 - access_count as f64 / ACCESS_SATURATION).max(0.0);
    let size_weight = (size_bytes as f64 / SIZE_SATURATION_BYTES).min(1.0);
    let interval_weight = if avg_interval_ms > 0.0 {
        (avg_interval_ms / INTERVAL_SATURATION_MS).min(1.0)
    } else {
        UNKNOWN_INTERVAL_WEIGHT
    };

    TIME_WEIGHT * time_weight
        + ACCESS_WEIGHT * access_weight
        + SIZE_WEIGHT * size_weight
        + INTERVAL_WEIGHT * interval_weight
}

// == Analysis ==
/// Scores every entry and sorts best eviction candidates first.
///
/// A key without an access pattern counts as never accessed: zero accesses,
/// last access at the epoch.
pub fn smart_eviction_analysis(request: &EvictionRequest) -> Result<Vec<EvictionCandidate>> {
    let patterns: HashMap<&str, &AccessPattern> = request
        .access_patterns
        .iter()
        .map(|p| (p.key.as_str(), p))
        .collect();

    let mut candidates = request
        .entries
        .iter()
        .map(|(key, value)| {
            let size = item_size(key, value)?.total_size;
            let (access_count, last_access_at, avg_interval) = match patterns.get(key.as_str()) {
                Some(p) => (p.access_count, p.last_access_at, p.avg_interval_millis),
                None => (0, 0, 0.0),
            };
            let time_since_last_access = request.current_time.saturating_sub(last_access_at);

            Ok(EvictionCandidate {
                key: key.clone(),
                score: eviction_score(time_since_last_access, access_count, size, avg_interval),
                time_since_last_access,
                access_count,
                size,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(candidates)
}
