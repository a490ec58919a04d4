//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CacheEntry, CacheKey};
use crate::db::Database;
use crate::error::{Result, SyncError};

/// Trait for cache storage backends.
///
/// Storage is an append-only log: `put` always adds a row, `get` returns the
/// most recent row for a key.
pub trait ResponseStore: Send + Sync {
  /// Most recent entry for `key`, if any.
  fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

  /// Record a response fetched at `fetched_at`.
  fn put(&self, key: &CacheKey, payload: &Value, fetched_at: DateTime<Utc>) -> Result<CacheEntry>;

  /// Delete entries fetched before `cutoff`. Returns the number removed.
  fn expire(&self, cutoff: DateTime<Utc>) -> Result<usize>;

  /// Delete every entry. Returns the number removed.
  fn clear(&self) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl ResponseStore for NoopStorage {
  fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
    Ok(None) // Always miss
  }

  fn put(&self, key: &CacheKey, payload: &Value, fetched_at: DateTime<Utc>) -> Result<CacheEntry> {
    Ok(CacheEntry {
      key: key.clone(),
      payload: payload.clone(),
      fetched_at,
    })
  }

  fn expire(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
    Ok(0)
  }

  fn clear(&self) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self::from_database(Database::open(path)?))
  }

  pub fn in_memory() -> Result<Self> {
    Ok(Self::from_database(Database::in_memory()?))
  }

  fn from_database(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_conn()),
    }
  }

  /// Number of stored entries for `key`, newest included.
  pub fn count(&self, key: &CacheKey) -> Result<usize> {
    let conn = self.conn.lock().map_err(SyncError::lock_poisoned)?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM response_cache WHERE cache_key = ?",
      params![key.cache_hash()],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }
}

impl ResponseStore for SqliteStorage {
  fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
    let conn = self.conn.lock().map_err(SyncError::lock_poisoned)?;

    let row: Option<(String, String)> = conn
      .query_row(
        "SELECT payload, fetched_at FROM response_cache
         WHERE cache_key = ?
         ORDER BY fetched_at DESC, id DESC
         LIMIT 1",
        params![key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((payload, fetched_at)) => Ok(Some(CacheEntry {
        key: key.clone(),
        payload: serde_json::from_str(&payload)?,
        fetched_at: parse_datetime(&fetched_at)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, key: &CacheKey, payload: &Value, fetched_at: DateTime<Utc>) -> Result<CacheEntry> {
    let conn = self.conn.lock().map_err(SyncError::lock_poisoned)?;
    let data = serde_json::to_string(payload)?;

    conn.execute(
      "INSERT INTO response_cache (cache_key, url, identity, payload, fetched_at)
       VALUES (?, ?, ?, ?, ?)",
      params![
        key.cache_hash(),
        key.url,
        key.identity,
        data,
        format_datetime(fetched_at)
      ],
    )?;

    Ok(CacheEntry {
      key: key.clone(),
      payload: payload.clone(),
      fetched_at,
    })
  }

  fn expire(&self, cutoff: DateTime<Utc>) -> Result<usize> {
    let conn = self.conn.lock().map_err(SyncError::lock_poisoned)?;
    let removed = conn.execute(
      "DELETE FROM response_cache WHERE fetched_at < ?",
      params![format_datetime(cutoff)],
    )?;
    Ok(removed)
  }

  fn clear(&self) -> Result<usize> {
    let conn = self.conn.lock().map_err(SyncError::lock_poisoned)?;
    let removed = conn.execute("DELETE FROM response_cache", [])?;
    Ok(removed)
  }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| SyncError::Store(format!("Failed to parse datetime '{}': {}", s, e)))
}
