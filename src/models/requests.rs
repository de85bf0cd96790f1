//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::{Arbitrary, MAX_KEY_LENGTH};

/// Request body for seeding an entry (PUT /entries)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: The value to store, in tagged form
/// - `ttl_ms`: Optional TTL in milliseconds (uses default if not specified)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRequest {
    pub key: String,
    pub value: Arbitrary,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        if self.ttl_ms == Some(0) {
            return Some("TTL must be positive".to_string());
        }
        None
    }
}
