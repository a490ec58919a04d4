//! SQLite database shared by the response cache and the rate limiter.

pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create the database at `path`, creating parent directories.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

    let db = Self { conn };
    db.run_migrations()?;
    Ok(db)
  }

  /// A private database that lives as long as the connection.
  pub fn in_memory() -> Result<Self> {
    let db = Self {
      conn: Connection::open_in_memory()?,
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Get the default database path
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| SyncError::Store("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("fitsync").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self.conn.execute_batch(schema::SCHEMA)?;
    Ok(())
  }

  pub fn into_conn(self) -> Connection {
    self.conn
  }
}
