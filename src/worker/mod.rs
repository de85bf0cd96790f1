//! Worker Module
//!
//! Offloaded computation unit and its caller-side client. The two sides only
//! exchange serialized request/response envelopes over channels.
//!
//! # Operations
//! - `SERIALIZE_DATA` / `DESERIALIZE_DATA` - tagged codec
//! - `COMPRESS_DATA` / `DECOMPRESS_DATA` - gzip, bytes as base64
//! - `BATCH_OPERATIONS` - several codec operations in one request
//! - `CALCULATE_MEMORY_USAGE` - per-entry UTF-16 size accounting
//! - `SMART_EVICTION_ANALYSIS` - blended eviction ranking

mod batch;
mod client;
mod eviction;
mod memory;
mod protocol;
mod unit;

pub use batch::{batch_operations, serialize_item};
pub use client::{WorkerClient, WORKER_CHANNEL_CAPACITY};
pub use eviction::{eviction_score, smart_eviction_analysis};
pub use memory::{calculate_memory_usage, item_size, utf16_bytes};
pub use protocol::{
    BatchItem, BatchItemResult, CompressResult, EvictionCandidate, EvictionRequest, ItemSize,
    MemoryUsageReport, OperationTag, RequestEnvelope, ResponseEnvelope,
};
pub use unit::{spawn_unit, ComputationUnit};
