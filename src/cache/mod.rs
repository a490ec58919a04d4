//! Persistent response cache.
//!
//! This module provides:
//! - An append-only log of raw API responses keyed by (URL, identity)
//! - A trust policy deciding when a stored response replaces a network call
//! - Maintenance operations (expiry by age, full clear)

mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, Reuse, TrustPolicy};
pub use storage::{NoopStorage, ResponseStore, SqliteStorage};
pub use traits::{CacheEntry, CacheKey, CacheResult, CacheSource};
