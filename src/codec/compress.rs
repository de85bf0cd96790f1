//! Compression Module
//!
//! Pluggable compression for serialized values. The default implementation is
//! gzip via flate2.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{CacheError, Result};

// == Compressor Contract ==
/// Reversible string -> bytes transform.
///
/// `decompress(compress(s)) == s` must hold for every string.
pub trait Compressor: Send + Sync {
    fn compress(&self, input: &str) -> Result<Vec<u8>>;
    fn decompress(&self, input: &[u8]) -> Result<String>;
}

// == Gzip ==
/// Gzip compressor backed by flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    /// Creates a compressor with the given level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, input: &str) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(input.as_bytes())
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CacheError::Compression(e.to_string()))
    }

    fn decompress(&self, input: &[u8]) -> Result<String> {
        let mut decoder = GzDecoder::new(input);
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| CacheError::Compression(format!("decompress: {}", e)))?;
        Ok(out)
    }
}

// == Compression Output ==
/// Compressed bytes plus how much space they saved.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutput {
    pub compressed: Vec<u8>,
    /// `(1 - compressed / original) * 100`; negative when output grew, 0 for empty input
    pub compression_ratio_percent: f64,
}

/// Compresses `input` and reports the space saving.
pub fn compress_with_ratio(compressor: &dyn Compressor, input: &str) -> Result<CompressionOutput> {
    let compressed = compressor.compress(input)?;
    let compression_ratio_percent = if input.is_empty() {
        0.0
    } else {
        (1.0 - compressed.len() as f64 / input.len() as f64) * 100.0
    };

    Ok(CompressionOutput {
        compressed,
        compression_ratio_percent,
    })
}
