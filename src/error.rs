//! Error types for the sync engine.
//!
//! Rate-limit exhaustion is deliberately absent here: it travels as
//! [`crate::remote::Fetch::Limited`] and surfaces as
//! [`crate::sync::SyncOutcome::Suspended`].

use thiserror::Error;

/// Fatal errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
  /// The remote API answered with an explicit error status or error payload.
  #[error("remote API error for {url} (status {status}): {message}")]
  Remote {
    url: String,
    status: u16,
    message: String,
  },

  /// The response body could not be interpreted.
  #[error("malformed response from {url}: {reason}")]
  MalformedResponse { url: String, reason: String },

  /// Transport-level failure talking to the remote API.
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  /// Cache or limiter database failure.
  #[error("cache store error: {0}")]
  Cache(#[from] rusqlite::Error),

  /// Shared store could not be used (poisoned lock, bad row contents).
  #[error("store error: {0}")]
  Store(String),

  /// Reading or writing a persisted output failed.
  #[error("persistence error: {0}")]
  Persistence(#[from] std::io::Error),

  /// Serialising or parsing a persisted JSON document failed.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The resource catalog is inconsistent.
  #[error("invalid catalog: {0}")]
  Catalog(String),

  /// No access token could be obtained for this round.
  #[error("cannot obtain access token: {0}")]
  Token(String),

  /// The identity-establishing resource did not yield what the catalog promised.
  #[error("cannot resolve identity: {0}")]
  Identity(String),
}

impl SyncError {
  pub(crate) fn lock_poisoned(e: impl std::fmt::Display) -> Self {
    Self::Store(format!("Lock poisoned: {}", e))
  }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
