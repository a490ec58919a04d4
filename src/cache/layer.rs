//! Cache layer that decides between reusing a stored response and fetching.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::storage::ResponseStore;
use super::traits::{CacheEntry, CacheKey, CacheResult};
use crate::catalog::Period;
use crate::error::Result;
use crate::remote::Fetch;

/// When a stored response may stand in for a remote call.
///
/// An entry is trusted only for a calendar partition, and only when all hold:
/// - the entry is at most `max_age` old;
/// - the partition is closed (ended at least `settle` ago);
/// - the entry was fetched after the partition closed, so it saw the final data.
///
/// Ungranular resources are never served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
  pub max_age: Duration,
  pub settle: Duration,
}

impl Default for TrustPolicy {
  fn default() -> Self {
    Self {
      max_age: Duration::days(7),
      settle: Duration::days(1),
    }
  }
}

impl TrustPolicy {
  pub fn trusts(&self, entry: &CacheEntry, period: Option<Period>, now: DateTime<Utc>) -> bool {
    let Some(period) = period else {
      return false;
    };
    if now - entry.fetched_at > self.max_age {
      return false;
    }
    if !period.is_closed(now, self.settle) {
      return false;
    }
    match period.end().checked_add_signed(self.settle) {
      Some(closed_at) => entry.fetched_at >= closed_at,
      None => false,
    }
  }
}

/// Whether the caller allows a cached response at all for this lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reuse {
  /// Apply the trust policy.
  IfTrusted,
  /// Always go to the network (still recording the response).
  Never,
}

/// Cache layer that manages trust decisions and recording of fresh responses.
pub struct CacheLayer<S: ResponseStore> {
  storage: Arc<S>,
  policy: TrustPolicy,
}

impl<S: ResponseStore> CacheLayer<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      policy: TrustPolicy::default(),
    }
  }

  pub fn with_policy(mut self, policy: TrustPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> TrustPolicy {
    self.policy
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// The stored entry for `key` if policy allows serving it.
  pub fn trusted(
    &self,
    key: &CacheKey,
    period: Option<Period>,
    now: DateTime<Utc>,
  ) -> Result<Option<CacheEntry>> {
    if period.is_none() {
      return Ok(None);
    }
    Ok(
      self
        .storage
        .get(key)?
        .filter(|entry| self.policy.trusts(entry, period, now)),
    )
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. If reuse is allowed and a trusted entry exists, return it
  /// 2. Otherwise call `fetcher`
  /// 3. Record every fetched payload (ungranular ones too, for auditing)
  /// 4. Pass a rate-limit signal through untouched; nothing is recorded
  pub async fn fetch<F, Fut>(
    &self,
    key: &CacheKey,
    period: Option<Period>,
    reuse: Reuse,
    now: DateTime<Utc>,
    fetcher: F,
  ) -> Result<Fetch<CacheResult<Value>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fetch>>,
  {
    if reuse == Reuse::IfTrusted {
      if let Some(entry) = self.trusted(key, period, now)? {
        debug!(url = %key.url, fetched_at = %entry.fetched_at, "Cache hit");
        return Ok(Fetch::Fetched(CacheResult::from_cache(
          entry.payload,
          entry.fetched_at,
        )));
      }
    }

    match fetcher().await? {
      Fetch::Fetched(payload) => {
        let entry = self.storage.put(key, &payload, now)?;
        Ok(Fetch::Fetched(CacheResult::from_network(
          entry.payload,
          entry.fetched_at,
        )))
      }
      Fetch::Limited { retry_after } => Ok(Fetch::Limited { retry_after }),
    }
  }
}

impl<S: ResponseStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      policy: self.policy,
    }
  }
}
