//! Worker Protocol Module
//!
//! Message envelopes exchanged with the computation unit and the payload
//! shapes of each operation. Everything here is plain JSON on the wire.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{AccessPattern, Arbitrary};
use crate::error::{CacheError, Result};

// == Operation Tags ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationTag {
    SerializeData,
    DeserializeData,
    CompressData,
    DecompressData,
    BatchOperations,
    CalculateMemoryUsage,
    SmartEvictionAnalysis,
}

impl OperationTag {
    pub const ALL: [OperationTag; 7] = [
        OperationTag::SerializeData,
        OperationTag::DeserializeData,
        OperationTag::CompressData,
        OperationTag::DecompressData,
        OperationTag::BatchOperations,
        OperationTag::CalculateMemoryUsage,
        OperationTag::SmartEvictionAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationTag::SerializeData => "SERIALIZE_DATA",
            OperationTag::DeserializeData => "DESERIALIZE_DATA",
            OperationTag::CompressData => "COMPRESS_DATA",
            OperationTag::DecompressData => "DECOMPRESS_DATA",
            OperationTag::BatchOperations => "BATCH_OPERATIONS",
            OperationTag::CalculateMemoryUsage => "CALCULATE_MEMORY_USAGE",
            OperationTag::SmartEvictionAnalysis => "SMART_EVICTION_ANALYSIS",
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationTag {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        OperationTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| CacheError::UnknownOperation(s.to_string()))
    }
}

// == Envelopes ==
/// Request sent to the unit. The caller picks the id; the unit echoes it.
///
/// `type` stays a raw string so an unknown tag can still be answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub data: Value,
}

impl RequestEnvelope {
    /// Builds a request with a fresh random id.
    pub fn new(tag: OperationTag, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            op_type: tag.as_str().to_string(),
            data,
        }
    }
}

/// Exactly one of these is produced per request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(id: Uuid, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Uuid, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Turns the envelope into the operation's outcome.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(CacheError::Worker(
                self.error
                    .unwrap_or_else(|| "worker reported failure without a message".to_string()),
            ))
        }
    }
}

// == Compression Payloads ==
/// Result of `COMPRESS_DATA`; the bytes travel as standard base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResult {
    pub compressed: String,
    pub compression_ratio_percent: f64,
}

// == Batch Payloads ==
/// One item of `BATCH_OPERATIONS`.
///
/// `type` is one of `serialize`, `deserialize`, `compress`, `decompress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub data: Value,
}

impl BatchItem {
    pub fn new(op_type: impl Into<String>, data: Value) -> Self {
        Self {
            op_type: op_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

// == Memory Payloads ==
/// Sizes of one entry in bytes, counted as UTF-16 code units times two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSize {
    pub key_size: u64,
    pub value_size: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsageReport {
    pub total_size: u64,
    pub item_sizes: BTreeMap<String, ItemSize>,
}

// == Eviction Payloads ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionRequest {
    /// `[key, value]` pairs to rank
    pub entries: Vec<(String, Arbitrary)>,
    #[serde(default)]
    pub access_patterns: Vec<AccessPattern>,
    /// Unix milliseconds the analysis is computed against
    pub current_time: u64,
}

/// A key ranked for possible removal; higher score goes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionCandidate {
    pub key: String,
    pub score: f64,
    pub time_since_last_access: u64,
    pub access_count: u64,
    pub size: u64,
}
