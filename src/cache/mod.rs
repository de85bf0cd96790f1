//! Cache Module
//!
//! TTL get-or-fetch caching: the value model, entries, the store contract,
//! access tracking, the retrying fetcher and the per-key controller.

mod access;
mod clock;
mod controller;
mod entry;
mod retry;
mod stats;
mod store;
mod value;


// Re-export public types
pub use access::{AccessPattern, AccessTracker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{CacheController, ControllerConfig, ControllerState, DEFAULT_TTL_MS};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use retry::{fetch_with_retry, RetryPolicy};
pub use stats::CacheStats;
pub use store::{MemoryStore, PersistentStore};
pub use value::{Arbitrary, BigInteger};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
