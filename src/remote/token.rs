//! Access-token acquisition. Tokens are fetched once per sync round and never
//! memoized here.

use async_trait::async_trait;

use crate::error::{Result, SyncError};

#[async_trait]
pub trait TokenSource: Send + Sync {
  async fn fresh_token(&self, identity: &str) -> Result<String>;
}

/// A token supplied up front (command line, tests).
#[derive(Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
  async fn fresh_token(&self, _identity: &str) -> Result<String> {
    Ok(self.0.clone())
  }
}

/// Re-reads the environment on every call so an external refresher can rotate it.
#[derive(Clone, Default)]
pub struct EnvToken;

impl EnvToken {
  pub const PRIMARY: &'static str = "FITSYNC_ACCESS_TOKEN";
  pub const FALLBACK: &'static str = "FITBIT_ACCESS_TOKEN";
}

#[async_trait]
impl TokenSource for EnvToken {
  async fn fresh_token(&self, _identity: &str) -> Result<String> {
    std::env::var(Self::PRIMARY)
      .or_else(|_| std::env::var(Self::FALLBACK))
      .map_err(|_| {
        SyncError::Token(format!(
          "Set {} or {} environment variable.",
          Self::PRIMARY,
          Self::FALLBACK
        ))
      })
  }
}
