//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;

use crate::cache::{AccessTracker, Clock, MemoryStore, PersistentStore, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, EntryResponse, HealthResponse, SetRequest, SetResponse, StatsResponse,
};
use crate::tasks::{run_maintenance_pass, MaintenanceBudget, MaintenanceReport};
use crate::worker::{ComputationUnit, RequestEnvelope, ResponseEnvelope, WorkerClient};

/// Application state shared across all handlers.
///
/// The store, tracker and worker client are the same instances the
/// maintenance task uses.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub tracker: Arc<AccessTracker>,
    pub worker: Arc<WorkerClient>,
    pub clock: Arc<dyn Clock>,
    /// TTL applied when a seeded entry does not carry one
    pub default_ttl_ms: u64,
    pub budget: MaintenanceBudget,
}

impl AppState {
    /// Creates a new AppState from its parts.
    pub fn new(
        store: Arc<MemoryStore>,
        worker: Arc<WorkerClient>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            tracker: Arc::new(AccessTracker::new()),
            worker,
            clock,
            default_ttl_ms: config.default_ttl_ms,
            budget: config.maintenance_budget(),
        }
    }

    /// Creates a new AppState with an empty store and a freshly spawned
    /// worker unit. Must be called inside a tokio runtime.
    pub fn from_config(config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let worker = Arc::new(WorkerClient::spawn(
            ComputationUnit::default(),
            config.worker_timeout(),
        ));
        Self::new(store, worker, clock, config)
    }
}

/// Handler for PUT /entries
///
/// Seeds an entry with an optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl_ms = req.ttl_ms.unwrap_or(state.default_ttl_ms);
    state.store.set(&req.key, req.value, ttl_ms)?;
    state.tracker.record_access(&req.key, state.clock.now_ms());

    Ok(Json(SetResponse::new(req.key, ttl_ms)))
}

/// Handler for GET /entries/:key
///
/// Returns the live entry for a key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryResponse>> {
    let now = state.clock.now_ms();
    let entry = state
        .store
        .get(&key)?
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;
    state.tracker.record_access(&key, now);

    Ok(Json(EntryResponse::new(entry, now)))
}

/// Handler for DELETE /entries/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.store.delete(&key)? {
        return Err(CacheError::NotFound(key));
    }
    state.tracker.remove(&key);

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /worker
///
/// Forwards a request envelope to the computation unit and returns its
/// response envelope. Operation failures come back as a `success: false`
/// envelope with status 200; only transport failures map to error statuses.
pub async fn worker_handler(
    State(state): State<AppState>,
    Json(request): Json<RequestEnvelope>,
) -> Result<Json<ResponseEnvelope>> {
    debug!(id = %request.id, op = %request.op_type, "Forwarding worker request");
    let response = state.worker.send(request).await?;
    Ok(Json(response))
}

/// Handler for POST /maintenance
///
/// Runs one maintenance pass right away.
pub async fn maintenance_handler(
    State(state): State<AppState>,
) -> Result<Json<MaintenanceReport>> {
    let report = run_maintenance_pass(
        &*state.store,
        &state.tracker,
        &state.worker,
        state.budget,
        state.clock.now_ms(),
    )
    .await?;
    Ok(Json(report))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        &state.store.stats(),
        state.tracker.len(),
        state.worker.pending_count(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Arbitrary, ManualClock};
    use crate::worker::OperationTag;
    use serde_json::json;
    use std::time::Duration;

    fn test_state(now: u64) -> (AppState, ManualClock) {
        let clock = ManualClock::new(now);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(MemoryStore::new(shared.clone()));
        let worker = Arc::new(WorkerClient::spawn(
            ComputationUnit::default(),
            Duration::from_secs(5),
        ));
        (AppState::new(store, worker, shared, &Config::default()), clock)
    }

    fn set_request(key: &str, value: Arbitrary, ttl_ms: Option<u64>) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl_ms,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let (state, _) = test_state(1_000);

        let req = set_request("test_key", Arbitrary::from("test_value"), None);
        let response = set_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(response.ttl_ms, 3_600_000);

        let response = get_handler(State(state.clone()), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, Arbitrary::from("test_value"));
        assert_eq!(response.ttl_remaining_ms, 3_600_000);
        assert_eq!(state.tracker.get("test_key").unwrap().access_count, 2);
    }

    #[tokio::test]
    async fn test_get_expired_entry_is_not_found() {
        let (state, clock) = test_state(0);
        let req = set_request("short", Arbitrary::from(1), Some(100));
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        clock.set(100);
        let result = get_handler(State(state), Path("short".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let (state, _) = test_state(0);

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let (state, _) = test_state(0);

        let req = set_request("to_delete", Arbitrary::from("value"), None);
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let result = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_ok());
        assert!(state.tracker.get("to_delete").is_none());

        let result = get_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_err());

        let result = delete_handler(State(state), Path("to_delete".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_worker_handler_returns_response_envelope() {
        let (state, _) = test_state(0);

        let request = RequestEnvelope::new(OperationTag::SerializeData, json!({"a": 1.0}));
        let id = request.id;
        let response = worker_handler(State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(response.id, id);
        assert!(response.success);
        assert_eq!(response.result, Some(json!(r#"{"a":1.0}"#)));

        let bogus = RequestEnvelope {
            id: uuid::Uuid::new_v4(),
            op_type: "NOPE".to_string(),
            data: json!(null),
        };
        let response = worker_handler(State(state), Json(bogus)).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Unknown operation type: NOPE"));
    }

    #[tokio::test]
    async fn test_maintenance_handler() {
        let (mut state, _) = test_state(0);
        state.budget = MaintenanceBudget {
            max_bytes: u64::MAX,
            max_entries: 1,
        };
        for key in ["a", "b"] {
            let req = set_request(key, Arbitrary::from(key), None);
            set_handler(State(state.clone()), Json(req)).await.unwrap();
        }

        let report = maintenance_handler(State(state.clone())).await.unwrap();
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(state.store.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _) = test_state(0);

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.pending_worker_requests, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let (state, _) = test_state(0);

        let req = set_request("", Arbitrary::from("value"), None);
        let result = set_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }
}
