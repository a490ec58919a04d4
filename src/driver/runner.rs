//! In-process suspend/resume loop around [`SyncEngine`].

use std::time::Duration;
use tracing::info;

use super::store::OutputStore;
use crate::cache::ResponseStore;
use crate::error::Result;
use crate::remote::{RemoteApi, TokenSource};
use crate::sync::{SyncEngine, SyncOutcome, SyncOutput};

/// Countdown before the next round.
///
/// A round that fetched nothing waits at least twice as long as the previous
/// wait. The result never exceeds `cap` unless the engine itself asked for more.
pub fn next_countdown(
  suggested: Duration,
  previous: Option<Duration>,
  fetched: usize,
  cap: Duration,
) -> Duration {
  let countdown = match previous {
    Some(previous) if fetched == 0 => suggested.max(previous.saturating_mul(2)),
    _ => suggested,
  };
  countdown.min(cap).max(suggested)
}

pub struct Runner<A: RemoteApi, S: ResponseStore, T: TokenSource, O: OutputStore> {
  engine: SyncEngine<A, S>,
  tokens: T,
  outputs: O,
  max_countdown: Duration,
}

impl<A, S, T, O> Runner<A, S, T, O>
where
  A: RemoteApi,
  S: ResponseStore,
  T: TokenSource,
  O: OutputStore,
{
  pub fn new(engine: SyncEngine<A, S>, tokens: T, outputs: O, max_countdown: Duration) -> Self {
    Self {
      engine,
      tokens,
      outputs,
      max_countdown,
    }
  }

  /// One round: fresh token, prior output, one sync pass, persist the result.
  pub async fn round(&self, identity: &str) -> Result<SyncOutcome> {
    let token = self.tokens.fresh_token(identity).await?;
    let prior = self.outputs.load(identity)?;
    let outcome = self.engine.sync(identity, &token, prior).await?;

    match &outcome {
      SyncOutcome::Merged(output) => self.outputs.save(identity, output)?,
      SyncOutcome::Suspended(suspension) if suspension.fetched > 0 => {
        self.outputs.save(identity, &suspension.partial)?
      }
      SyncOutcome::Suspended(_) => {}
    }
    Ok(outcome)
  }

  /// Run rounds until the sync completes, sleeping between suspensions.
  pub async fn run(&self, identity: &str) -> Result<SyncOutput> {
    let mut previous: Option<Duration> = None;
    let mut rounds = 0u32;

    loop {
      rounds += 1;
      match self.round(identity).await? {
        SyncOutcome::Merged(output) => {
          info!(identity, rounds, "Sync finished");
          return Ok(output);
        }
        SyncOutcome::Suspended(suspension) => {
          let countdown = next_countdown(
            suspension.countdown,
            previous,
            suspension.fetched,
            self.max_countdown,
          );
          info!(
            identity,
            rounds,
            fetched = suspension.fetched,
            countdown_secs = countdown.as_secs(),
            "Waiting for rate budget"
          );
          tokio::time::sleep(countdown).await;
          previous = Some(countdown);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheLayer, SqliteStorage};
  use crate::catalog::{Catalog, Granularity, IdentityProbe, Resource};
  use crate::clock::{Clock, FixedClock};
  use crate::driver::FileOutputStore;
  use crate::ratelimit::{Quota, RateLimiter};
  use crate::remote::{Fetch, StaticToken};
  use async_trait::async_trait;
  use chrono::{TimeZone, Utc};
  use serde_json::json;
  use std::path::Path;
  use std::sync::Arc;

  struct ProfileAndSteps;

  #[async_trait]
  impl RemoteApi for ProfileAndSteps {
    fn url_for(&self, path: &str) -> String {
      format!("https://fake.test{}", path)
    }

    async fn get_json(&self, url: &str, _access_token: &str) -> Result<Fetch> {
      if url.ends_with("/profile.json") {
        return Ok(Fetch::Fetched(json!({
          "user": {"encodedId": "ABC", "memberSince": "2020-05-01"}
        })));
      }
      Ok(Fetch::Fetched(json!({ "url": url })))
    }
  }

  fn runner(
    dir: &Path,
    per_identity: u32,
  ) -> Runner<ProfileAndSteps, SqliteStorage, StaticToken, FileOutputStore> {
    let catalog = Catalog::new(
      vec![
        Resource::new("profile", "/-/profile.json", Granularity::None).unwrap(),
        Resource::new(
          "steps",
          "/{user_id}/steps/date/{start}/{end}.json",
          Granularity::Yearly,
        )
        .unwrap(),
      ],
      IdentityProbe {
        resource: "profile".to_string(),
        account_pointer: "/user/encodedId".to_string(),
        since_pointer: "/user/memberSince".to_string(),
      },
    )
    .unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
      Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap(),
    ));
    let engine = SyncEngine::new(
      catalog,
      ProfileAndSteps,
      CacheLayer::new(SqliteStorage::in_memory().unwrap()),
      RateLimiter::in_memory(Quota::per_hour(100), Quota::per_hour(per_identity)),
    )
    .with_clock(clock);

    Runner::new(
      engine,
      StaticToken("t".to_string()),
      FileOutputStore::new(dir),
      Duration::from_secs(3600),
    )
  }

  #[test]
  fn test_countdown_doubles_without_progress() {
    let min = Duration::from_secs(60);
    let cap = Duration::from_secs(3600);

    assert_eq!(next_countdown(min, None, 0, cap), min);
    assert_eq!(next_countdown(min, Some(min), 5, cap), min);
    assert_eq!(next_countdown(min, Some(min), 0, cap), Duration::from_secs(120));
    assert_eq!(
      next_countdown(min, Some(Duration::from_secs(2400)), 0, cap),
      cap
    );
    // The engine's own wait is never shortened by the cap.
    let long = Duration::from_secs(7200);
    assert_eq!(next_countdown(long, Some(long), 0, cap), long);
  }

  #[tokio::test]
  async fn test_round_persists_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path(), 2);

    let outcome = runner.round("alice").await.unwrap();
    assert!(outcome.is_suspended());

    let saved = runner.outputs.load("alice").unwrap().unwrap();
    assert_eq!(saved.account.as_deref(), Some("ABC"));
    assert!(saved.period("steps", "2020").is_some());
    assert!(saved.period("steps", "2021").is_none());
  }

  #[tokio::test]
  async fn test_run_completes_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path(), 100);

    let output = runner.run("alice").await.unwrap();
    let keys: Vec<&String> = output.periods("steps").unwrap().keys().collect();
    assert_eq!(keys, vec!["2020", "2021"]);
    assert_eq!(runner.outputs.load("alice").unwrap(), Some(output));
  }
}
