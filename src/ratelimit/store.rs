//! Budget storage backends.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use super::realm::{shortfall, Acquire, Realm};
use crate::db::Database;
use crate::error::{Result, SyncError};

/// Where granted requests are recorded.
pub trait BudgetStore: Send + Sync {
  /// Consume `cost` from every realm, or from none of them if any realm lacks
  /// budget. Must be atomic with respect to other callers of the same store.
  fn try_consume(&self, realms: &[Realm], cost: u32, now: DateTime<Utc>) -> Result<Acquire>;
}

/// Pick the realm that frees up last: that is when the whole request fits.
fn worst(exhausted: Vec<(String, std::time::Duration)>) -> Option<Acquire> {
  exhausted
    .into_iter()
    .max_by_key(|(_, wait)| *wait)
    .map(|(realm, retry_after)| Acquire::Exhausted { realm, retry_after })
}

/// Process-local budget.
#[derive(Default)]
pub struct MemoryBudget {
  events: Mutex<HashMap<String, VecDeque<(i64, u32)>>>,
}

impl MemoryBudget {
  pub fn new() -> Self {
    Self::default()
  }
}

impl BudgetStore for MemoryBudget {
  fn try_consume(&self, realms: &[Realm], cost: u32, now: DateTime<Utc>) -> Result<Acquire> {
    let mut events = self.events.lock().map_err(SyncError::lock_poisoned)?;
    let now_ms = now.timestamp_millis();

    let mut exhausted = Vec::new();
    for realm in realms {
      let mut in_window: Vec<(i64, u32)> = Vec::new();
      if let Some(log) = events.get_mut(&realm.name) {
        let horizon = now_ms - realm.quota.window.as_millis() as i64;
        while log.front().is_some_and(|(at, _)| *at <= horizon) {
          log.pop_front();
        }
        in_window.extend(log.iter().copied());
        if log.is_empty() {
          events.remove(&realm.name);
        }
      }
      if let Some(wait) = shortfall(&in_window, &realm.quota, cost, now_ms) {
        exhausted.push((realm.name.clone(), wait));
      }
    }

    if let Some(acquire) = worst(exhausted) {
      return Ok(acquire);
    }

    for realm in realms {
      events
        .entry(realm.name.clone())
        .or_default()
        .push_back((now_ms, cost));
    }
    Ok(Acquire::Granted)
  }
}

/// Budget shared by every process using the same database file.
pub struct SqliteBudget {
  conn: Mutex<Connection>,
}

impl SqliteBudget {
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(Database::open(path)?.into_conn()),
    })
  }

  pub fn in_memory() -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(Database::in_memory()?.into_conn()),
    })
  }
}

impl BudgetStore for SqliteBudget {
  fn try_consume(&self, realms: &[Realm], cost: u32, now: DateTime<Utc>) -> Result<Acquire> {
    let mut conn = self.conn.lock().map_err(SyncError::lock_poisoned)?;
    let now_ms = now.timestamp_millis();

    // IMMEDIATE takes the write lock up front so concurrent processes serialize here.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut exhausted = Vec::new();
    for realm in realms {
      let horizon = now_ms - realm.quota.window.as_millis() as i64;
      tx.execute(
        "DELETE FROM rate_events WHERE realm = ? AND at_ms <= ?",
        params![realm.name, horizon],
      )?;

      let in_window: Vec<(i64, u32)> = {
        let mut stmt = tx.prepare(
          "SELECT at_ms, cost FROM rate_events WHERE realm = ? ORDER BY at_ms, id",
        )?;
        let rows = stmt.query_map(params![realm.name], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        collected
      };

      if let Some(wait) = shortfall(&in_window, &realm.quota, cost, now_ms) {
        exhausted.push((realm.name.clone(), wait));
      }
    }

    if let Some(acquire) = worst(exhausted) {
      tx.commit()?;
      return Ok(acquire);
    }

    for realm in realms {
      tx.execute(
        "INSERT INTO rate_events (realm, cost, at_ms) VALUES (?, ?, ?)",
        params![realm.name, cost, now_ms],
      )?;
    }
    tx.commit()?;
    Ok(Acquire::Granted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ratelimit::Quota;
  use chrono::{Duration, TimeZone};
  use std::sync::Arc;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap()
  }

  fn realms(global: u32, identity: u32) -> Vec<Realm> {
    vec![
      Realm::global(Quota::per_hour(global)),
      Realm::identity("alice", Quota::per_hour(identity)),
    ]
  }

  fn exercise(store: &dyn BudgetStore) {
    let both = realms(10, 2);

    assert!(store.try_consume(&both, 1, now()).unwrap().is_granted());
    assert!(store.try_consume(&both, 1, now()).unwrap().is_granted());

    match store.try_consume(&both, 1, now()).unwrap() {
      Acquire::Exhausted { realm, retry_after } => {
        assert_eq!(realm, "identity:alice");
        assert_eq!(retry_after, std::time::Duration::from_secs(3600));
      }
      Acquire::Granted => panic!("identity realm should be exhausted"),
    }

    // The rejected request did not touch the global realm: 8 left there.
    let global_only = vec![Realm::global(Quota::per_hour(10))];
    for _ in 0..8 {
      assert!(store.try_consume(&global_only, 1, now()).unwrap().is_granted());
    }
    assert!(!store.try_consume(&global_only, 1, now()).unwrap().is_granted());

    // After the window rolls past, budget is back.
    let later = now() + Duration::hours(1) + Duration::seconds(1);
    assert!(store.try_consume(&both, 1, later).unwrap().is_granted());
  }

  #[test]
  fn test_memory_budget() {
    exercise(&MemoryBudget::new());
  }

  #[test]
  fn test_memory_budget_rejection_leaves_no_realm_behind() {
    let store = MemoryBudget::new();
    let global = Realm::global(Quota::per_hour(1));
    assert!(store.try_consume(&[global.clone()], 1, now()).unwrap().is_granted());

    let bob = Realm::identity("bob", Quota::per_hour(5));
    assert!(!store.try_consume(&[global, bob], 1, now()).unwrap().is_granted());
    assert!(!store.events.lock().unwrap().contains_key("identity:bob"));

    // A fully expired realm is dropped on the next check.
    let later = now() + Duration::hours(2);
    let carol = Realm::identity("carol", Quota::per_hour(0));
    let global = Realm::global(Quota::per_hour(1));
    assert!(!store.try_consume(&[global, carol], 1, later).unwrap().is_granted());
    assert!(store.events.lock().unwrap().is_empty());
  }

  #[test]
  fn test_sqlite_budget() {
    exercise(&SqliteBudget::in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_budget_is_shared_between_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("limits.db");
    let a = SqliteBudget::open(&path).unwrap();
    let b = SqliteBudget::open(&path).unwrap();
    let global = vec![Realm::global(Quota::per_hour(3))];

    assert!(a.try_consume(&global, 2, now()).unwrap().is_granted());
    assert!(!b.try_consume(&global, 2, now()).unwrap().is_granted());
    assert!(b.try_consume(&global, 1, now()).unwrap().is_granted());
  }

  #[test]
  fn test_concurrent_callers_never_overspend() {
    let store = Arc::new(MemoryBudget::new());
    let global = vec![Realm::global(Quota::per_hour(50))];

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let store = Arc::clone(&store);
        let global = global.clone();
        std::thread::spawn(move || {
          (0..20)
            .filter(|_| store.try_consume(&global, 1, now()).unwrap().is_granted())
            .count()
        })
      })
      .collect();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, 50);
  }
}
