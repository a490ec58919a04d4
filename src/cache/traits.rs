//! Core types for the response cache.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Identifies one remote response: the request URL as seen by one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub url: String,
  pub identity: String,
}

impl CacheKey {
  pub fn new(url: impl Into<String>, identity: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      identity: identity.into(),
    }
  }

  /// Stable, fixed-length key used for storage lookups.
  pub fn cache_hash(&self) -> String {
    let input = format!("{}\n{}", self.identity, self.url);

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// One stored response. Entries are never mutated after they are written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub payload: Value,
  pub fetched_at: DateTime<Utc>,
}

/// Result from a cache-aware fetch, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was fetched from the remote API
  pub fetched_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at,
    }
  }

  pub fn from_cache(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      fetched_at,
    }
  }
}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from the remote API
  Network,
  /// A trusted cache entry
  Cache,
}
