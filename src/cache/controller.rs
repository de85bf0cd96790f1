//! Cache Controller Module
//!
//! Get-or-fetch façade for a single cache key: read the store, otherwise run
//! the producer through the retrying fetcher and write the result through.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{
    fetch_with_retry, AccessTracker, Arbitrary, Clock, PersistentStore, RetryPolicy, SystemClock,
};

/// Default time to live of a controller's entries: one hour.
pub const DEFAULT_TTL_MS: u64 = 3_600_000;

// == Controller Config ==
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// TTL of every entry this controller writes
    pub ttl_ms: u64,
    /// When false, `read` returns `initial_value` and touches nothing
    pub enabled: bool,
    /// Value reported before the first successful read and while disabled
    pub initial_value: Arbitrary,
    /// Retry policy wrapped around the producer
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            enabled: true,
            initial_value: Arbitrary::Null,
            retry: RetryPolicy::default(),
        }
    }
}

// == Controller State ==
/// What a subscriber sees: the latest value, whether a fetch is in flight,
/// and the error of the last failed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub data: Arbitrary,
    pub loading: bool,
    pub error: Option<String>,
}

// == Cache Controller ==
/// One controller per cache key.
///
/// Producer errors are handed back exactly as the producer returned them.
/// Store errors are never retried.
pub struct CacheController<S, P> {
    key: String,
    store: Arc<S>,
    producer: P,
    config: ControllerConfig,
    clock: Arc<dyn Clock>,
    tracker: Option<Arc<AccessTracker>>,
    state: watch::Sender<ControllerState>,
}

impl<S, P, Fut> CacheController<S, P>
where
    S: PersistentStore,
    P: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<Arbitrary>>,
{
    // == Constructor ==
    /// Creates a controller for `key`. Nothing is read until `read` is called.
    pub fn new(
        key: impl Into<String>,
        store: Arc<S>,
        producer: P,
        config: ControllerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ControllerState {
            data: config.initial_value.clone(),
            loading: false,
            error: None,
        });

        Self {
            key: key.into(),
            store,
            producer,
            config,
            clock: Arc::new(SystemClock),
            tracker: None,
            state,
        }
    }

    /// Uses `clock` for access timestamps instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Records every read and write of the key into `tracker`.
    pub fn with_access_tracker(mut self, tracker: Arc<AccessTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Latest published state.
    pub fn state(&self) -> ControllerState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    // == Read ==
    /// Returns the cached value if live, otherwise fetches and writes through.
    ///
    /// A failed fetch leaves any previous entry and the published data alone.
    pub async fn read(&self) -> anyhow::Result<Arbitrary> {
        if !self.config.enabled {
            return Ok(self.config.initial_value.clone());
        }

        if let Some(entry) = self.store.get(&self.key)? {
            debug!(key = %self.key, "Cache hit");
            self.record_access();
            self.publish_data(entry.value.clone());
            return Ok(entry.value);
        }

        debug!(key = %self.key, "Cache miss");
        self.fetch_and_store().await
    }

    // == Invalidate And Refetch ==
    /// Skips the store lookup and always calls the producer.
    pub async fn invalidate_and_refetch(&self) -> anyhow::Result<Arbitrary> {
        if !self.config.enabled {
            return Ok(self.config.initial_value.clone());
        }

        info!(key = %self.key, "Invalidating and refetching");
        self.fetch_and_store().await
    }

    // == Re-invocation ==
    /// Points the controller at another key and reads it once.
    ///
    /// Returns `None` when the key did not change.
    pub async fn set_key(&mut self, key: impl Into<String>) -> Option<anyhow::Result<Arbitrary>> {
        let key = key.into();
        if key == self.key {
            return None;
        }
        self.key = key;
        Some(self.read().await)
    }

    /// Turns the controller on or off and reads once.
    ///
    /// Returns `None` when the flag did not change.
    pub async fn set_enabled(&mut self, enabled: bool) -> Option<anyhow::Result<Arbitrary>> {
        if enabled == self.config.enabled {
            return None;
        }
        self.config.enabled = enabled;
        Some(self.read().await)
    }

    async fn fetch_and_store(&self) -> anyhow::Result<Arbitrary> {
        self.state.send_modify(|state| state.loading = true);

        match fetch_with_retry(|| (self.producer)(), self.config.retry).await {
            Ok(value) => {
                if let Err(err) = self.store.set(&self.key, value.clone(), self.config.ttl_ms) {
                    self.publish_error(err.to_string());
                    return Err(err.into());
                }
                info!(
                    key = %self.key,
                    ttl_ms = self.config.ttl_ms,
                    "Fetched value written through"
                );
                self.record_access();
                self.publish_data(value.clone());
                Ok(value)
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "Fetch failed, keeping previous value");
                self.publish_error(err.to_string());
                Err(err)
            }
        }
    }

    fn record_access(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.record_access(&self.key, self.clock.now_ms());
        }
    }

    fn publish_data(&self, data: Arbitrary) {
        self.state.send_modify(|state| {
            state.data = data;
            state.loading = false;
            state.error = None;
        });
    }

    fn publish_error(&self, error: String) {
        self.state.send_modify(|state| {
            state.loading = false;
            state.error = Some(error);
        });
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, ManualClock, MemoryStore};
    use crate::error::{CacheError, Result};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("rpc node unreachable")]
    struct RpcDown;

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            retry: RetryPolicy::new(2, 1),
            ..ControllerConfig::default()
        }
    }

    fn constant_producer(
        calls: Arc<AtomicU32>,
        value: f64,
    ) -> impl Fn() -> std::future::Ready<anyhow::Result<Arbitrary>> {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(Arbitrary::from(value)))
        }
    }

    fn failing_producer(
        calls: Arc<AtomicU32>,
    ) -> impl Fn() -> std::future::Ready<anyhow::Result<Arbitrary>> {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(anyhow::Error::new(RpcDown)))
        }
    }

    fn manual_store(start: u64) -> (Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(start);
        (Arc::new(MemoryStore::new(Arc::new(clock.clone()))), clock)
    }

    #[tokio::test]
    async fn test_price_scenario() {
        let (store, clock) = manual_store(0);
        let calls = Arc::new(AtomicU32::new(0));
        let config = ControllerConfig {
            ttl_ms: 60_000,
            ..fast_config()
        };
        let controller = CacheController::new(
            "price-BTC",
            store.clone(),
            constant_producer(calls.clone(), 42.5),
            config,
        );

        assert_eq!(controller.read().await.unwrap(), Arbitrary::from(42.5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("price-BTC").unwrap().unwrap().expires_at, 60_000);

        clock.set(30_000);
        assert_eq!(controller.read().await.unwrap(), Arbitrary::from(42.5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.set(70_000);
        assert_eq!(controller.read().await.unwrap(), Arbitrary::from(42.5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_surfaces_after_retries() {
        let (store, _) = manual_store(0);
        let calls = Arc::new(AtomicU32::new(0));
        let controller =
            CacheController::new("k", store, failing_producer(calls.clone()), fast_config());

        let err = controller.read().await.unwrap_err();
        assert!(err.downcast_ref::<RpcDown>().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let state = controller.state();
        assert_eq!(state.error.as_deref(), Some("rpc node unreachable"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_value() {
        let (store, _) = manual_store(0);
        let should_fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = should_fail.clone();
        let producer = move || {
            let fail = flag.load(Ordering::SeqCst);
            async move {
                if fail {
                    Err(anyhow::Error::new(RpcDown))
                } else {
                    Ok(Arbitrary::from("fresh"))
                }
            }
        };
        let controller = CacheController::new("k", store.clone(), producer, fast_config());

        controller.read().await.unwrap();
        should_fail.store(true, Ordering::SeqCst);
        assert!(controller.invalidate_and_refetch().await.is_err());

        assert_eq!(store.get("k").unwrap().unwrap().value, Arbitrary::from("fresh"));
        assert_eq!(controller.state().data, Arbitrary::from("fresh"));
    }

    #[tokio::test]
    async fn test_disabled_returns_initial_value_without_io() {
        let (store, _) = manual_store(0);
        let calls = Arc::new(AtomicU32::new(0));
        let config = ControllerConfig {
            enabled: false,
            initial_value: Arbitrary::from("placeholder"),
            ..fast_config()
        };
        let controller = CacheController::new(
            "k",
            store.clone(),
            constant_producer(calls.clone(), 1.0),
            config,
        );

        assert_eq!(controller.read().await.unwrap(), Arbitrary::from("placeholder"));
        assert_eq!(
            controller.invalidate_and_refetch().await.unwrap(),
            Arbitrary::from("placeholder")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
        assert_eq!(store.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (store, _) = manual_store(0);
        let calls = Arc::new(AtomicU32::new(0));
        let controller = CacheController::new(
            "k",
            store.clone(),
            constant_producer(calls.clone(), 7.0),
            fast_config(),
        );

        controller.invalidate_and_refetch().await.unwrap();
        let once = store.get("k").unwrap().unwrap().value;
        controller.invalidate_and_refetch().await.unwrap();
        let twice = store.get("k").unwrap().unwrap().value;

        assert_eq!(once, twice);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_key_and_enabled_trigger_one_read() {
        let (store, _) = manual_store(0);
        let calls = Arc::new(AtomicU32::new(0));
        let config = ControllerConfig {
            enabled: false,
            ..fast_config()
        };
        let mut controller = CacheController::new(
            "a",
            store.clone(),
            constant_producer(calls.clone(), 1.0),
            config,
        );

        assert!(controller.set_enabled(false).await.is_none());
        assert!(controller.set_enabled(true).await.unwrap().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(controller.set_key("a").await.is_none());
        assert!(controller.set_key("b").await.unwrap().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(controller.key(), "b");
        assert!(store.get("b").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_subscribers_see_new_data() {
        let (store, _) = manual_store(0);
        let calls = Arc::new(AtomicU32::new(0));
        let controller =
            CacheController::new("k", store, constant_producer(calls, 3.0), fast_config());
        let mut rx = controller.subscribe();

        assert_eq!(rx.borrow_and_update().data, Arbitrary::Null);
        controller.read().await.unwrap();

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.data, Arbitrary::from(3.0));
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_access_tracker_records_reads_and_writes() {
        let (store, clock) = manual_store(0);
        let tracker = Arc::new(AccessTracker::new());
        let calls = Arc::new(AtomicU32::new(0));
        let controller =
            CacheController::new("k", store, constant_producer(calls, 1.0), fast_config())
                .with_clock(Arc::new(clock.clone()))
                .with_access_tracker(tracker.clone());

        controller.read().await.unwrap();
        clock.set(500);
        controller.read().await.unwrap();

        let pattern = tracker.get("k").unwrap();
        assert_eq!(pattern.access_count, 2);
        assert_eq!(pattern.last_access_at, 500);
    }

    #[derive(Debug)]
    struct CorruptStore;

    impl PersistentStore for CorruptStore {
        fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Err(CacheError::Deserialization("bad bytes".to_string()))
        }
        fn set(&self, _key: &str, _value: Arbitrary, _ttl_millis: u64) -> Result<()> {
            Ok(())
        }
        fn delete(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
        fn entries(&self) -> Result<Vec<CacheEntry>> {
            Ok(Vec::new())
        }
        fn purge_expired(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let controller = CacheController::new(
            "k",
            Arc::new(CorruptStore),
            constant_producer(calls.clone(), 1.0),
            fast_config(),
        );

        let err = controller.read().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::Deserialization(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
