//! Adaptive Cache - a local TTL cache with offloaded computation
//!
//! Provides a get-or-fetch cache controller with retrying fetches, a
//! persistent store contract, and a computation unit reached through
//! request/response envelopes for codec, memory accounting and smart
//! eviction work.

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;
pub mod worker;

pub use api::AppState;
pub use cache::{Arbitrary, CacheController, ControllerConfig, MemoryStore, PersistentStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_maintenance_task;
pub use worker::{ComputationUnit, WorkerClient};
