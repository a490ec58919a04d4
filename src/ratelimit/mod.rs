//! Request budgets per realm over a rolling window.
//!
//! `acquire` never waits: it grants or reports exhaustion immediately so the
//! orchestrator can suspend instead of spinning.

mod realm;
mod store;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub use realm::{Acquire, Quota, Realm};
pub use store::{BudgetStore, MemoryBudget, SqliteBudget};

use crate::error::Result;

/// Rate limiter with a global realm and one realm per identity.
#[derive(Clone)]
pub struct RateLimiter {
  store: Arc<dyn BudgetStore>,
  global: Quota,
  per_identity: Quota,
}

impl RateLimiter {
  pub fn new(store: impl BudgetStore + 'static, global: Quota, per_identity: Quota) -> Self {
    Self {
      store: Arc::new(store),
      global,
      per_identity,
    }
  }

  /// In-process limiter with the given quotas.
  pub fn in_memory(global: Quota, per_identity: Quota) -> Self {
    Self::new(MemoryBudget::new(), global, per_identity)
  }

  /// Realms that gate one request made on behalf of `identity`.
  pub fn realms_for(&self, identity: &str) -> [Realm; 2] {
    [
      Realm::global(self.global),
      Realm::identity(identity, self.per_identity),
    ]
  }

  /// Consume `cost` from all `realms`, or from none.
  pub fn acquire(&self, realms: &[Realm], cost: u32, now: DateTime<Utc>) -> Result<Acquire> {
    let acquire = self.store.try_consume(realms, cost, now)?;
    match &acquire {
      Acquire::Granted => debug!(cost, realms = realms.len(), "Rate budget granted"),
      Acquire::Exhausted { realm, retry_after } => {
        info!(realm = %realm, retry_after_secs = retry_after.as_secs(), "Rate budget exhausted")
      }
    }
    Ok(acquire)
  }

  /// One request for `identity` against both of its realms.
  pub fn acquire_for(&self, identity: &str, now: DateTime<Utc>) -> Result<Acquire> {
    self.acquire(&self.realms_for(identity), 1, now)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_identities_share_the_global_realm() {
    let limiter = RateLimiter::in_memory(Quota::per_hour(3), Quota::per_hour(2));
    let now = Utc.with_ymd_and_hms(2021, 6, 15, 0, 0, 0).unwrap();

    assert!(limiter.acquire_for("alice", now).unwrap().is_granted());
    assert!(limiter.acquire_for("alice", now).unwrap().is_granted());
    assert!(!limiter.acquire_for("alice", now).unwrap().is_granted());

    assert!(limiter.acquire_for("bob", now).unwrap().is_granted());
    match limiter.acquire_for("bob", now).unwrap() {
      Acquire::Exhausted { realm, .. } => assert_eq!(realm, Realm::GLOBAL),
      Acquire::Granted => panic!("global realm should be exhausted"),
    }
  }
}
