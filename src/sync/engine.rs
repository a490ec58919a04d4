//! One synchronization pass for one identity.
//!
//! A pass walks the catalog in order: ungranular resources first (the identity
//! probe among them establishes the account and the history start), then every
//! period of every calendar resource. Each fetch goes cache first, then the
//! limiter, then the remote API. Budget exhaustion from either the limiter or
//! the server ends the pass with [`SyncOutcome::Suspended`].

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::merge::{carry_over, merge};
use super::output::SyncOutput;
use crate::cache::{CacheKey, CacheLayer, CacheResult, CacheSource, ResponseStore, Reuse};
use crate::catalog::{periods_between, Catalog, Period, TemplateParams};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SyncError};
use crate::ratelimit::{Acquire, RateLimiter};
use crate::remote::{Fetch, RemoteApi};

/// Tunables for the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
  /// Shortest countdown handed back on suspension.
  pub suspend_countdown: Duration,
  /// How many of the most recent closed periods per resource are fetched again
  /// every run, for data the remote finalises late.
  pub refetch_recent_periods: usize,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      suspend_countdown: Duration::from_secs(60),
      refetch_recent_periods: 0,
    }
  }
}

/// A pass that ran out of budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
  /// Wait at least this long before the next pass.
  pub countdown: Duration,
  /// Partitions fetched from the remote API during this pass.
  pub fetched: usize,
  /// Prior output plus every closed partition obtained during this pass.
  pub partial: SyncOutput,
}

impl Suspension {
  pub fn countdown_secs(&self) -> u64 {
    self.countdown.as_secs()
  }
}

/// Result of [`SyncEngine::sync`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
  /// The whole catalog is synced. Replaces the prior output wholesale.
  Merged(SyncOutput),
  /// Budget ran out; call again after the countdown.
  Suspended(Suspension),
}

impl SyncOutcome {
  pub fn is_suspended(&self) -> bool {
    matches!(self, SyncOutcome::Suspended(_))
  }
}

/// Who the data belongs to, as reported by the identity probe.
#[derive(Debug, Clone)]
struct Subject {
  account: String,
  since: NaiveDate,
}

/// The sync state machine.
///
/// The engine holds no per-identity state; it assumes at most one pass per
/// identity runs at a time.
pub struct SyncEngine<A: RemoteApi, S: ResponseStore> {
  catalog: Catalog,
  api: A,
  cache: CacheLayer<S>,
  limiter: RateLimiter,
  clock: Arc<dyn Clock>,
  settings: SyncSettings,
}

impl<A: RemoteApi, S: ResponseStore> SyncEngine<A, S> {
  pub fn new(catalog: Catalog, api: A, cache: CacheLayer<S>, limiter: RateLimiter) -> Self {
    Self {
      catalog,
      api,
      cache,
      limiter,
      clock: Arc::new(SystemClock),
      settings: SyncSettings::default(),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_settings(mut self, settings: SyncSettings) -> Self {
    self.settings = settings;
    self
  }

  /// Run one pass for `identity`.
  ///
  /// `prior` is the output persisted by an earlier pass (merged or partial).
  /// Remote errors other than rate limiting are returned as errors and abort
  /// the pass; whatever was fetched before stays in the response cache.
  pub async fn sync(
    &self,
    identity: &str,
    access_token: &str,
    prior: Option<SyncOutput>,
  ) -> Result<SyncOutcome> {
    let now = self.clock.now();
    let prior = prior.unwrap_or_default();
    info!(
      identity,
      resources = self.catalog.resources().len(),
      prior_periods = prior.period_count(),
      "Starting sync"
    );

    let mut fresh = SyncOutput::default();
    let mut fetched = 0usize;
    let mut subject: Option<Subject> = None;

    for resource in self.catalog.ungranular() {
      let path = resource.template.render(&TemplateParams {
        user_id: subject.as_ref().map(|s| s.account.as_str()),
        period: None,
      })?;
      let url = self.api.url_for(&path);

      let result = match self
        .fetch(identity, access_token, &url, None, Reuse::Never, now)
        .await?
      {
        Fetch::Fetched(result) => result,
        Fetch::Limited { retry_after } => {
          // Without the probe there is nothing to bound the calendar walk by.
          let partial = match &subject {
            Some(subject) => merge(&carry_over(prior, &subject.account), &fresh),
            None => prior,
          };
          return Ok(self.suspend(identity, retry_after, fetched, partial));
        }
      };
      fetched += 1;

      if resource.name == self.catalog.probe().resource {
        let resolved = self.resolve_subject(&url, &result.data)?;
        debug!(identity, account = %resolved.account, since = %resolved.since, "Resolved account");
        fresh.account = Some(resolved.account.clone());
        subject = Some(resolved);
      }
      fresh.set_single(&resource.name, result.data);
    }

    let subject = subject.ok_or_else(|| {
      SyncError::Catalog(format!(
        "identity resource {} was not fetched",
        self.catalog.probe().resource
      ))
    })?;
    let base = carry_over(prior, &subject.account);

    let settle = self.cache.policy().settle;
    let today = now.date_naive();
    let mut open: Vec<(String, String)> = Vec::new();

    for resource in self.catalog.calendar() {
      let periods = periods_between(resource.granularity, subject.since, today);
      let slack = self.refetch_slack(&periods, now, settle);

      for period in periods {
        let key = period.key();
        let closed = period.is_closed(now, settle);
        let forced = slack.contains(&period);

        if closed && !forced && base.is_complete(&resource.name, &key) {
          continue;
        }

        let path = resource.template.render(&TemplateParams {
          user_id: Some(subject.account.as_str()),
          period: Some(period),
        })?;
        let url = self.api.url_for(&path);
        let reuse = if forced { Reuse::Never } else { Reuse::IfTrusted };

        match self
          .fetch(identity, access_token, &url, Some(period), reuse, now)
          .await?
        {
          Fetch::Fetched(result) => {
            if result.source == CacheSource::Network {
              fetched += 1;
            }
            fresh.set_period(&resource.name, &key, result.data);
            if closed {
              fresh.mark_complete(&resource.name, &key);
            } else {
              open.push((resource.name.clone(), key.clone()));
            }
          }
          Fetch::Limited { retry_after } => {
            let mut settled = fresh;
            for (name, key) in &open {
              settled.remove_period(name, key);
            }
            let partial = merge(&base, &settled);
            return Ok(self.suspend(identity, retry_after, fetched, partial));
          }
        }
      }
    }

    let output = merge(&base, &fresh);
    info!(
      identity,
      fetched,
      periods = output.period_count(),
      "Sync complete"
    );
    Ok(SyncOutcome::Merged(output))
  }

  /// Cache first, then the limiter, then the network.
  async fn fetch(
    &self,
    identity: &str,
    access_token: &str,
    url: &str,
    period: Option<Period>,
    reuse: Reuse,
    now: DateTime<Utc>,
  ) -> Result<Fetch<CacheResult<Value>>> {
    let key = CacheKey::new(url, identity);
    let limiter = &self.limiter;
    let api = &self.api;

    self
      .cache
      .fetch(&key, period, reuse, now, move || async move {
        match limiter.acquire_for(identity, now)? {
          Acquire::Granted => {
            debug!(url, "Fetching from remote");
            api.get_json(url, access_token).await
          }
          Acquire::Exhausted { retry_after, .. } => Ok(Fetch::Limited {
            retry_after: Some(retry_after),
          }),
        }
      })
      .await
  }

  /// The last `refetch_recent_periods` closed periods.
  fn refetch_slack(&self, periods: &[Period], now: DateTime<Utc>, settle: ChronoDuration) -> Vec<Period> {
    periods
      .iter()
      .rev()
      .filter(|p| p.is_closed(now, settle))
      .take(self.settings.refetch_recent_periods)
      .copied()
      .collect()
  }

  fn resolve_subject(&self, url: &str, payload: &Value) -> Result<Subject> {
    let probe = self.catalog.probe();
    let malformed = |reason: String| SyncError::MalformedResponse {
      url: url.to_string(),
      reason,
    };

    let account = match payload.pointer(&probe.account_pointer) {
      Some(Value::String(s)) if !s.is_empty() => s.clone(),
      Some(Value::Number(n)) => n.to_string(),
      _ => return Err(malformed(format!("no account id at {}", probe.account_pointer))),
    };

    let since = payload
      .pointer(&probe.since_pointer)
      .and_then(Value::as_str)
      .ok_or_else(|| malformed(format!("no start date at {}", probe.since_pointer)))?;
    let since = NaiveDate::parse_from_str(since, "%Y-%m-%d")
      .map_err(|e| malformed(format!("bad start date {:?}: {}", since, e)))?;

    Ok(Subject { account, since })
  }

  fn suspend(
    &self,
    identity: &str,
    retry_after: Option<Duration>,
    fetched: usize,
    partial: SyncOutput,
  ) -> SyncOutcome {
    let floor = self.settings.suspend_countdown;
    let countdown = retry_after.map_or(floor, |hint| hint.max(floor));
    info!(
      identity,
      countdown_secs = countdown.as_secs(),
      fetched,
      "Rate limited, suspending sync"
    );
    SyncOutcome::Suspended(Suspension {
      countdown,
      fetched,
      partial,
    })
  }
}
