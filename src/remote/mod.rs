//! Remote API seam: the only place the engine talks to the network.

mod client;
mod token;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use client::HttpApi;
pub use token::{EnvToken, StaticToken, TokenSource};

use crate::error::Result;

/// Outcome of anything that may hit a rate limit.
///
/// Exhaustion is an expected outcome, not an error, so it is a value here and
/// never a [`crate::error::SyncError`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T = Value> {
  Fetched(T),
  /// Budget exhausted; `retry_after` is the server's or limiter's hint.
  Limited { retry_after: Option<Duration> },
}

impl<T> Fetch<T> {
  pub fn is_limited(&self) -> bool {
    matches!(self, Fetch::Limited { .. })
  }
}

/// A JSON-over-HTTP API authorised by a bearer token.
#[async_trait]
pub trait RemoteApi: Send + Sync {
  /// Absolute URL for a rendered catalog path.
  fn url_for(&self, path: &str) -> String;

  /// GET `url`. Rate-limit responses come back as [`Fetch::Limited`]; every
  /// other failure is an error.
  async fn get_json(&self, url: &str, access_token: &str) -> Result<Fetch>;
}

#[async_trait]
impl<T: RemoteApi + ?Sized> RemoteApi for Arc<T> {
  fn url_for(&self, path: &str) -> String {
    (**self).url_for(path)
  }

  async fn get_json(&self, url: &str, access_token: &str) -> Result<Fetch> {
    (**self).get_json(url, access_token).await
  }
}
