//! Worker Client Module
//!
//! Caller side of the worker channel: hands out request ids, keeps a table of
//! waiters keyed by id, routes each response to its waiter regardless of
//! arrival order, and gives up on requests that outlive the timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::Arbitrary;
use crate::codec::{self, CompressionOutput};
use crate::error::{CacheError, Result};
use crate::worker::protocol::{
    BatchItem, BatchItemResult, CompressResult, EvictionCandidate, EvictionRequest,
    MemoryUsageReport, OperationTag, RequestEnvelope, ResponseEnvelope,
};
use crate::worker::unit::{spawn_unit, ComputationUnit};

/// Buffered messages per direction.
pub const WORKER_CHANNEL_CAPACITY: usize = 256;

type PendingTable = Arc<Mutex<HashMap<Uuid, oneshot::Sender<ResponseEnvelope>>>>;

// == Worker Client ==
pub struct WorkerClient {
    outbox: mpsc::Sender<String>,
    pending: PendingTable,
    timeout: Duration,
    router: JoinHandle<()>,
    unit: Option<JoinHandle<()>>,
}

impl WorkerClient {
    // == Constructors ==
    /// Starts `unit` on its own task and connects to it.
    pub fn spawn(unit: ComputationUnit, timeout: Duration) -> Self {
        let (req_tx, req_rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        let (resp_tx, resp_rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        let unit_handle = spawn_unit(unit, req_rx, resp_tx);

        let mut client = Self::connect(req_tx, resp_rx, timeout);
        client.unit = Some(unit_handle);
        client
    }

    /// Talks to whatever sits at the other end of the two channels.
    pub fn connect(
        outbox: mpsc::Sender<String>,
        inbox: mpsc::Receiver<String>,
        timeout: Duration,
    ) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let router = spawn_router(inbox, pending.clone());

        Self {
            outbox,
            pending,
            timeout,
            router,
            unit: None,
        }
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // == Send ==
    /// Sends an envelope and waits for the response with the same id.
    ///
    /// The waiter is removed however the call ends (response, timeout, or the
    /// future being dropped), so a late response is discarded.
    pub async fn send(&self, request: RequestEnvelope) -> Result<ResponseEnvelope> {
        let id = request.id;
        let raw =
            serde_json::to_string(&request).map_err(|e| CacheError::Internal(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&id) {
                return Err(CacheError::InvalidRequest(format!(
                    "request id {} is already in flight",
                    id
                )));
            }
            pending.insert(id, tx);
        }
        let _slot = PendingSlot {
            pending: &self.pending,
            id,
        };

        debug!(%id, op = %request.op_type, "Worker request dispatched");
        if self.outbox.send(raw).await.is_err() {
            return Err(CacheError::WorkerUnavailable(
                "request channel closed".to_string(),
            ));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CacheError::WorkerUnavailable(
                "worker stopped before responding".to_string(),
            )),
            Err(_) => {
                warn!(
                    %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Worker request timed out"
                );
                Err(CacheError::WorkerTimeout {
                    id,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Runs one operation and returns its raw result.
    pub async fn request(&self, tag: OperationTag, data: Value) -> Result<Value> {
        self.send(RequestEnvelope::new(tag, data))
            .await?
            .into_result()
    }

    async fn request_as<T: DeserializeOwned>(&self, tag: OperationTag, data: Value) -> Result<T> {
        let result = self.request(tag, data).await?;
        serde_json::from_value(result)
            .map_err(|e| CacheError::Internal(format!("unexpected {} result: {}", tag, e)))
    }

    // == Typed Operations ==
    pub async fn serialize(&self, value: &Arbitrary) -> Result<String> {
        self.request_as(OperationTag::SerializeData, codec::to_json(value)?)
            .await
    }

    pub async fn deserialize(&self, text: &str) -> Result<Arbitrary> {
        let result = self
            .request(OperationTag::DeserializeData, Value::String(text.to_string()))
            .await?;
        codec::from_json(result)
    }

    pub async fn compress(&self, text: &str) -> Result<CompressionOutput> {
        let result: CompressResult = self
            .request_as(OperationTag::CompressData, Value::String(text.to_string()))
            .await?;
        let compressed = BASE64_STANDARD
            .decode(result.compressed.as_bytes())
            .map_err(|e| CacheError::Compression(e.to_string()))?;

        Ok(CompressionOutput {
            compressed,
            compression_ratio_percent: result.compression_ratio_percent,
        })
    }

    pub async fn decompress(&self, bytes: &[u8]) -> Result<String> {
        self.request_as(
            OperationTag::DecompressData,
            Value::String(BASE64_STANDARD.encode(bytes)),
        )
        .await
    }

    pub async fn batch(&self, items: Vec<BatchItem>) -> Result<Vec<BatchItemResult>> {
        let data = serde_json::to_value(items).map_err(|e| CacheError::Internal(e.to_string()))?;
        self.request_as(OperationTag::BatchOperations, data).await
    }

    pub async fn memory_usage(&self, entries: &[(String, Arbitrary)]) -> Result<MemoryUsageReport> {
        let data =
            serde_json::to_value(entries).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.request_as(OperationTag::CalculateMemoryUsage, data)
            .await
    }

    pub async fn eviction_analysis(
        &self,
        request: &EvictionRequest,
    ) -> Result<Vec<EvictionCandidate>> {
        let data =
            serde_json::to_value(request).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.request_as(OperationTag::SmartEvictionAnalysis, data)
            .await
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.router.abort();
        if let Some(unit) = &self.unit {
            unit.abort();
        }
    }
}

// == Pending Slot ==
/// Removes a waiter from the table when its `send` call ends, including when
/// the caller drops the future before a response arrives.
struct PendingSlot<'a> {
    pending: &'a PendingTable,
    id: Uuid,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

// == Router ==
/// Delivers each response to the waiter registered under its id.
///
/// When the inbox closes every remaining waiter is dropped, which fails
/// their `send` with `WorkerUnavailable`.
fn spawn_router(mut inbox: mpsc::Receiver<String>, pending: PendingTable) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(raw) = inbox.recv().await {
            let response: ResponseEnvelope = match serde_json::from_str(&raw) {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "Discarded undecodable worker response");
                    continue;
                }
            };

            let waiter = pending.lock().remove(&response.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => debug!(id = %response.id, "No waiter for response, dropping"),
            }
        }

        let abandoned = {
            let mut table = pending.lock();
            let count = table.len();
            table.clear();
            count
        };
        if abandoned > 0 {
            warn!(abandoned, "Worker channel closed with requests in flight");
        }
    })
}
