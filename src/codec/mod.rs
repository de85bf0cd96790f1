//! Codec Module
//!
//! Tagged serialization of cached values and pluggable compression.

mod compress;
mod serialize;

pub use compress::{compress_with_ratio, CompressionOutput, Compressor, GzipCompressor};
pub use serialize::{deserialize, from_json, serialize, to_json, KIND_FIELD, PAYLOAD_FIELD};
