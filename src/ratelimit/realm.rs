use std::fmt;
use std::time::Duration;

/// Request budget per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
  pub max_requests: u32,
  pub window: Duration,
}

impl Quota {
  pub fn per_hour(max_requests: u32) -> Self {
    Self {
      max_requests,
      window: Duration::from_secs(3600),
    }
  }
}

/// A named budget scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
  pub name: String,
  pub quota: Quota,
}

impl Realm {
  pub const GLOBAL: &'static str = "global";

  pub fn global(quota: Quota) -> Self {
    Self {
      name: Self::GLOBAL.to_string(),
      quota,
    }
  }

  pub fn identity(identity: &str, quota: Quota) -> Self {
    Self {
      name: format!("identity:{}", identity),
      quota,
    }
  }
}

impl fmt::Display for Realm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} ({}/{}s)",
      self.name,
      self.quota.max_requests,
      self.quota.window.as_secs()
    )
  }
}

/// Result of asking for budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
  Granted,
  /// At least one realm is out of budget. Nothing was consumed.
  Exhausted { realm: String, retry_after: Duration },
}

impl Acquire {
  pub fn is_granted(&self) -> bool {
    matches!(self, Acquire::Granted)
  }
}

/// Decide whether `cost` fits in a realm whose in-window grants are `events`
/// (`(at_ms, cost)`, oldest first, already pruned to the window).
///
/// Returns `None` if it fits, otherwise how long until enough budget frees up.
pub(crate) fn shortfall(events: &[(i64, u32)], quota: &Quota, cost: u32, now_ms: i64) -> Option<Duration> {
  let used: u64 = events.iter().map(|(_, c)| u64::from(*c)).sum();
  let limit = u64::from(quota.max_requests);
  let cost = u64::from(cost);

  if used + cost <= limit {
    return None;
  }
  if cost > limit {
    return Some(quota.window);
  }

  let window_ms = quota.window.as_millis() as i64;
  let needed = used + cost - limit;
  let mut freed = 0u64;
  for (at_ms, c) in events {
    freed += u64::from(*c);
    if freed >= needed {
      let wait_ms = (at_ms + window_ms - now_ms).max(0);
      return Some(Duration::from_millis(wait_ms as u64));
    }
  }
  Some(quota.window)
}
