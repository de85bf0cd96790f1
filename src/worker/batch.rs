//! Batch Operations Module
//!
//! Runs a list of small codec operations in one round trip.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde_json::Value;

use crate::cache::Arbitrary;
use crate::codec::{self, compress_with_ratio, Compressor};
use crate::error::{CacheError, Result};
use crate::worker::protocol::{BatchItem, BatchItemResult, CompressResult};

// == Codec Operations ==
// Shared with the unit's top-level dispatch.

pub(crate) fn serialize_op(data: Value) -> Result<Value> {
    let value = codec::from_json(data).map_err(|e| CacheError::Serialization(inner(e)))?;
    Ok(Value::String(codec::serialize(&value)?))
}

pub(crate) fn deserialize_op(data: Value) -> Result<Value> {
    let text = expect_string(data, "deserialize")?;
    let value = codec::deserialize(&text)?;
    codec::to_json(&value)
}

pub(crate) fn compress_op(compressor: &dyn Compressor, data: Value) -> Result<Value> {
    let text = expect_string(data, "compress")?;
    let output = compress_with_ratio(compressor, &text)?;
    let result = CompressResult {
        compressed: BASE64_STANDARD.encode(&output.compressed),
        compression_ratio_percent: output.compression_ratio_percent,
    };
    serde_json::to_value(result).map_err(|e| CacheError::Internal(e.to_string()))
}

pub(crate) fn decompress_op(compressor: &dyn Compressor, data: Value) -> Result<Value> {
    let encoded = expect_string(data, "decompress")?;
    let bytes = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| CacheError::Compression(format!("invalid base64 input: {}", e)))?;
    Ok(Value::String(compressor.decompress(&bytes)?))
}

// == Batch ==
/// Runs every item in order and returns one result per item.
///
/// `deserialize` and `decompress` failures stay inside their item's result.
/// A `serialize` or `compress` failure fails the whole batch.
pub fn batch_operations(
    compressor: &dyn Compressor,
    items: Vec<BatchItem>,
) -> Result<Vec<BatchItemResult>> {
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let result = match item.op_type.as_str() {
            "serialize" => BatchItemResult::ok(serialize_op(item.data)?),
            "compress" => BatchItemResult::ok(compress_op(compressor, item.data)?),
            "deserialize" => isolate(deserialize_op(item.data)),
            "decompress" => isolate(decompress_op(compressor, item.data)),
            other => BatchItemResult::failure(format!("Unknown batch operation type: {}", other)),
        };
        results.push(result);
    }

    Ok(results)
}

fn isolate(outcome: Result<Value>) -> BatchItemResult {
    match outcome {
        Ok(value) => BatchItemResult::ok(value),
        Err(err) => BatchItemResult::failure(err.to_string()),
    }
}

fn expect_string(data: Value, op: &str) -> Result<String> {
    match data {
        Value::String(s) => Ok(s),
        other => Err(CacheError::InvalidRequest(format!(
            "{} expects a string, got {}",
            op, other
        ))),
    }
}

/// Drops the variant prefix so a re-wrapped error reads once.
fn inner(err: CacheError) -> String {
    match err {
        CacheError::Deserialization(msg) | CacheError::Serialization(msg) => msg,
        other => other.to_string(),
    }
}

/// Encodes a value for a `serialize` item.
pub fn serialize_item(value: &Arbitrary) -> Result<BatchItem> {
    Ok(BatchItem::new("serialize", codec::to_json(value)?))
}
