//! Maintenance Task
//!
//! Background task that periodically drops expired entries and, when the
//! store is over budget, evicts the entries the worker ranks highest.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::{AccessTracker, Arbitrary, Clock, PersistentStore};
use crate::error::Result;
use crate::worker::{EvictionRequest, WorkerClient};

// == Budget ==
/// Limits the maintenance pass enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceBudget {
    /// Upper bound on the summed entry sizes, in bytes
    pub max_bytes: u64,
    /// Upper bound on the number of live entries
    pub max_entries: usize,
}

impl MaintenanceBudget {
    fn exceeded(&self, total_bytes: u64, entries: usize) -> bool {
        total_bytes > self.max_bytes || entries > self.max_entries
    }
}

// == Report ==
/// What one maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub expired_removed: usize,
    pub entries_before: usize,
    pub entries_after: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Evicted keys, in eviction order
    pub evicted: Vec<String>,
}

// == Maintenance Pass ==
/// Runs one maintenance pass.
///
/// # Steps
/// 1. Purge expired entries and forget their access patterns
/// 2. Ask the worker for the total size of the live entries
/// 3. If a budget is exceeded, ask the worker for an eviction ranking and
///    evict from the top until both budgets hold
pub async fn run_maintenance_pass<S>(
    store: &S,
    tracker: &AccessTracker,
    worker: &WorkerClient,
    budget: MaintenanceBudget,
    now_ms: u64,
) -> Result<MaintenanceReport>
where
    S: PersistentStore + ?Sized,
{
    let mut report = MaintenanceReport {
        expired_removed: store.purge_expired()?,
        ..MaintenanceReport::default()
    };

    let pairs: Vec<(String, Arbitrary)> = store
        .entries()?
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect();
    let live: HashSet<&str> = pairs.iter().map(|(key, _)| key.as_str()).collect();
    tracker.retain(|key| live.contains(key));

    let usage = worker.memory_usage(&pairs).await?;
    report.entries_before = pairs.len();
    report.bytes_before = usage.total_size;

    let mut entries = pairs.len();
    let mut bytes = usage.total_size;

    if budget.exceeded(bytes, entries) {
        info!(
            bytes,
            entries,
            max_bytes = budget.max_bytes,
            max_entries = budget.max_entries,
            "Cache over budget, running smart eviction"
        );

        let candidates = worker
            .eviction_analysis(&EvictionRequest {
                entries: pairs,
                access_patterns: tracker.snapshot(),
                current_time: now_ms,
            })
            .await?;

        for candidate in candidates {
            if !budget.exceeded(bytes, entries) {
                break;
            }
            if store.evict(&candidate.key)? {
                tracker.remove(&candidate.key);
                bytes = bytes.saturating_sub(candidate.size);
                entries -= 1;
                debug!(key = %candidate.key, score = candidate.score, "Evicted entry");
                report.evicted.push(candidate.key);
            }
        }
    }

    report.entries_after = entries;
    report.bytes_after = bytes;
    Ok(report)
}

/// Spawns a background task that runs a maintenance pass every interval.
///
/// # Arguments
/// * `store` - Store to maintain
/// * `tracker` - Access patterns fed to the eviction ranking
/// * `worker` - Client of the computation unit
/// * `budget` - Limits to enforce
/// * `interval_secs` - Seconds between passes
/// * `clock` - Time source for the eviction ranking
///
/// # Returns
/// A JoinHandle for the spawned task, which can be aborted on shutdown.
pub fn spawn_maintenance_task<S>(
    store: Arc<S>,
    tracker: Arc<AccessTracker>,
    worker: Arc<WorkerClient>,
    budget: MaintenanceBudget,
    interval_secs: u64,
    clock: Arc<dyn Clock>,
) -> JoinHandle<()>
where
    S: PersistentStore + 'static,
{
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting maintenance task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match run_maintenance_pass(&*store, &tracker, &worker, budget, clock.now_ms()).await {
                Ok(report) if report.expired_removed > 0 || !report.evicted.is_empty() => {
                    info!(
                        expired = report.expired_removed,
                        evicted = report.evicted.len(),
                        bytes_after = report.bytes_after,
                        entries_after = report.entries_after,
                        "Maintenance pass finished"
                    );
                }
                Ok(_) => debug!("Maintenance pass: nothing to do"),
                Err(err) => error!(error = %err, "Maintenance pass failed"),
            }
        }
    })
}
