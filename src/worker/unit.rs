//! Computation Unit Module
//!
//! The offloaded worker. It owns no state shared with callers: requests come
//! in as JSON strings, responses go out as JSON strings, and every failure is
//! turned into an error response for the request's id.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::Arbitrary;
use crate::codec::{Compressor, GzipCompressor};
use crate::error::{CacheError, Result};
use crate::worker::batch::{
    batch_operations, compress_op, decompress_op, deserialize_op, serialize_op,
};
use crate::worker::eviction::smart_eviction_analysis;
use crate::worker::memory::calculate_memory_usage;
use crate::worker::protocol::{OperationTag, RequestEnvelope, ResponseEnvelope};

// == Computation Unit ==
/// Stateless operation executor. Cloning is cheap.
#[derive(Clone)]
pub struct ComputationUnit {
    compressor: Arc<dyn Compressor>,
}

impl ComputationUnit {
    pub fn new(compressor: Arc<dyn Compressor>) -> Self {
        Self { compressor }
    }

    // == Execute ==
    /// Runs one request to completion and builds its response.
    pub fn execute(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let id = request.id;
        let outcome = request
            .op_type
            .parse::<OperationTag>()
            .and_then(|tag| self.dispatch(tag, request.data));

        match outcome {
            Ok(result) => ResponseEnvelope::ok(id, result),
            Err(err) => {
                debug!(%id, op = %request.op_type, error = %err, "Operation failed");
                ResponseEnvelope::failure(id, err.to_string())
            }
        }
    }

    fn dispatch(&self, tag: OperationTag, data: Value) -> Result<Value> {
        let compressor = self.compressor.as_ref();
        match tag {
            OperationTag::SerializeData => serialize_op(data),
            OperationTag::DeserializeData => deserialize_op(data),
            OperationTag::CompressData => compress_op(compressor, data),
            OperationTag::DecompressData => decompress_op(compressor, data),
            OperationTag::BatchOperations => to_value(batch_operations(compressor, parse(data)?)?),
            OperationTag::CalculateMemoryUsage => {
                let entries: Vec<(String, Arbitrary)> = parse(data)?;
                to_value(calculate_memory_usage(&entries)?)
            }
            OperationTag::SmartEvictionAnalysis => {
                to_value(smart_eviction_analysis(&parse(data)?)?)
            }
        }
    }
}

impl Default for ComputationUnit {
    fn default() -> Self {
        Self::new(Arc::new(GzipCompressor::default()))
    }
}

fn parse<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| CacheError::InvalidRequest(format!("malformed payload: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| CacheError::Internal(e.to_string()))
}

/// Parses a request; on failure recovers the id if there is one.
fn decode_request(raw: &str) -> std::result::Result<RequestEnvelope, Option<(Uuid, String)>> {
    let value: Value = serde_json::from_str(raw).map_err(|_| None)?;
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok());

    serde_json::from_value::<RequestEnvelope>(value)
        .map_err(|e| id.map(|id| (id, format!("Malformed request envelope: {}", e))))
}

// == Spawn ==
/// Starts the unit on its own task.
///
/// Each request runs on the blocking pool so a slow operation never stalls
/// the loop; responses go out as they finish, in any order. A panicking
/// operation answers with an error and the unit keeps serving. The task ends
/// when `inbox` closes.
pub fn spawn_unit(
    unit: ComputationUnit,
    mut inbox: mpsc::Receiver<String>,
    outbox: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Computation unit started");

        while let Some(raw) = inbox.recv().await {
            let request = match decode_request(&raw) {
                Ok(request) => request,
                Err(Some((id, reason))) => {
                    warn!(%id, %reason, "Rejected malformed request");
                    send_response(&outbox, ResponseEnvelope::failure(id, reason)).await;
                    continue;
                }
                Err(None) => {
                    warn!("Dropped request without a usable id");
                    continue;
                }
            };

            let unit = unit.clone();
            let outbox = outbox.clone();
            tokio::spawn(async move {
                let id = request.id;
                let outcome = tokio::task::spawn_blocking(move || unit.execute(request)).await;
                let response = match outcome {
                    Ok(response) => response,
                    Err(err) => {
                        warn!(%id, error = %err, "Operation panicked");
                        ResponseEnvelope::failure(id, format!("Operation panicked: {}", err))
                    }
                };
                send_response(&outbox, response).await;
            });
        }

        info!("Computation unit stopped");
    })
}

async fn send_response(outbox: &mpsc::Sender<String>, response: ResponseEnvelope) {
    match serde_json::to_string(&response) {
        Ok(raw) => {
            if outbox.send(raw).await.is_err() {
                debug!(id = %response.id, "Response dropped, caller is gone");
            }
        }
        Err(err) => warn!(id = %response.id, error = %err, "Could not encode response"),
    }
}
