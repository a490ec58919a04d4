//! Pure merging of sync outputs. No I/O happens here.

use tracing::warn;

use super::output::{ResourceData, SyncOutput};

/// Prior output that may be carried into a run for `account`.
///
/// Prior data tagged with another account, or with no account at all, belongs
/// to someone else as far as we can tell and is dropped.
pub fn carry_over(prior: SyncOutput, account: &str) -> SyncOutput {
  match prior.account.as_deref() {
    Some(previous) if previous == account => prior,
    Some(previous) => {
      warn!(
        previous,
        current = account,
        discarded = prior.resources.len(),
        "Account changed, discarding prior output"
      );
      SyncOutput::for_account(account)
    }
    None => {
      if !prior.is_empty() {
        warn!(
          current = account,
          discarded = prior.resources.len(),
          "Prior output has no account marker, discarding it"
        );
      }
      SyncOutput::for_account(account)
    }
  }
}

/// Merge `fresh` over `prior`.
///
/// Fresh single payloads replace prior ones; fresh periods replace prior
/// periods with the same key and leave the others in place. A replaced period
/// is complete only if the fresh one is. If both outputs
/// name an account and they differ, the prior output is dropped entirely.
pub fn merge(prior: &SyncOutput, fresh: &SyncOutput) -> SyncOutput {
  if let (Some(a), Some(b)) = (&prior.account, &fresh.account) {
    if a != b {
      return fresh.clone();
    }
  }

  let mut merged = prior.clone();
  if fresh.account.is_some() {
    merged.account = fresh.account.clone();
  }

  for (name, data) in &fresh.resources {
    match data {
      ResourceData::Single(value) => merged.set_single(name, value.clone()),
      ResourceData::Periodic(periods) => {
        for (key, value) in periods {
          merged.set_period(name, key, value.clone());
          if fresh.is_complete(name, key) {
            merged.mark_complete(name, key);
          }
        }
      }
    }
  }
  merged
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn prior() -> SyncOutput {
    let mut out = SyncOutput::for_account("A");
    out.set_single("profile", json!({"v": 1}));
    out.set_period("steps", "2019", json!({"v": 2019}));
    out.mark_complete("steps", "2019");
    out.set_period("steps", "2020", json!({"v": "old"}));
    out.mark_complete("steps", "2020");
    out
  }

  #[test]
  fn test_fresh_periods_extend_and_replace() {
    let mut fresh = SyncOutput::for_account("A");
    fresh.set_single("profile", json!({"v": 2}));
    fresh.set_period("steps", "2020", json!({"v": "new"}));
    fresh.set_period("steps", "2021", json!({"v": 2021}));

    let merged = merge(&prior(), &fresh);
    assert_eq!(merged.account.as_deref(), Some("A"));
    assert_eq!(merged.single("profile"), Some(&json!({"v": 2})));
    assert_eq!(merged.period("steps", "2019"), Some(&json!({"v": 2019})));
    assert_eq!(merged.period("steps", "2020"), Some(&json!({"v": "new"})));
    assert_eq!(merged.period("steps", "2021"), Some(&json!({"v": 2021})));

    assert!(merged.is_complete("steps", "2019"));
    assert!(!merged.is_complete("steps", "2020"));
    assert!(!merged.is_complete("steps", "2021"));
  }

  #[test]
  fn test_merge_with_empty_fresh_is_identity() {
    assert_eq!(merge(&prior(), &SyncOutput::default()), prior());
  }

  #[test]
  fn test_conflicting_accounts_keep_only_fresh() {
    let mut fresh = SyncOutput::for_account("B");
    fresh.set_period("steps", "2021", json!(1));

    let merged = merge(&prior(), &fresh);
    assert_eq!(merged, fresh);
    assert!(merged.period("steps", "2019").is_none());
  }

  #[test]
  fn test_carry_over() {
    assert_eq!(carry_over(prior(), "A"), prior());
    assert_eq!(carry_over(prior(), "B"), SyncOutput::for_account("B"));

    let mut unmarked = prior();
    unmarked.account = None;
    assert_eq!(carry_over(unmarked, "A"), SyncOutput::for_account("A"));
  }
}
