//! Calendar partitions.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a resource's history is split into fetchable units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
  /// One payload for the whole resource (profiles, summaries).
  None,
  Yearly,
  Monthly,
  Daily,
}

impl Granularity {
  pub fn is_calendar(self) -> bool {
    !matches!(self, Granularity::None)
  }
}

impl fmt::Display for Granularity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Granularity::None => "none",
      Granularity::Yearly => "yearly",
      Granularity::Monthly => "monthly",
      Granularity::Daily => "daily",
    };
    f.write_str(s)
  }
}

/// One calendar period. Ordering is chronological within a granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
  Year(i32),
  Month { year: i32, month: u32 },
  Day(NaiveDate),
}

impl Period {
  /// The period of the given granularity that contains `date`.
  /// `None` for [`Granularity::None`], which has no periods.
  pub fn containing(granularity: Granularity, date: NaiveDate) -> Option<Self> {
    match granularity {
      Granularity::None => None,
      Granularity::Yearly => Some(Period::Year(date.year())),
      Granularity::Monthly => Some(Period::Month {
        year: date.year(),
        month: date.month(),
      }),
      Granularity::Daily => Some(Period::Day(date)),
    }
  }

  /// Stable key used in persisted output.
  pub fn key(&self) -> String {
    match self {
      Period::Year(year) => format!("{:04}", year),
      Period::Month { year, month } => format!("{:04}-{:02}", year, month),
      Period::Day(date) => date.format("%Y-%m-%d").to_string(),
    }
  }

  pub fn first_day(&self) -> NaiveDate {
    match *self {
      Period::Year(year) => NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN),
      Period::Month { year, month } => {
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
      }
      Period::Day(date) => date,
    }
  }

  pub fn last_day(&self) -> NaiveDate {
    match self.next() {
      Some(next) => next.first_day().pred_opt().unwrap_or(NaiveDate::MAX),
      None => NaiveDate::MAX,
    }
  }

  pub fn next(&self) -> Option<Self> {
    match *self {
      Period::Year(year) => Some(Period::Year(year + 1)),
      Period::Month { year, month: 12 } => Some(Period::Month {
        year: year + 1,
        month: 1,
      }),
      Period::Month { year, month } => Some(Period::Month {
        year,
        month: month + 1,
      }),
      Period::Day(date) => date.succ_opt().map(Period::Day),
    }
  }

  /// Instant at which the period stops accumulating data (exclusive, UTC midnight).
  pub fn end(&self) -> DateTime<Utc> {
    match self.next() {
      Some(next) => next
        .first_day()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC),
      None => DateTime::<Utc>::MAX_UTC,
    }
  }

  /// A period is closed once it ended at least `settle` before `now`.
  pub fn is_closed(&self, now: DateTime<Utc>, settle: Duration) -> bool {
    match self.end().checked_add_signed(settle) {
      Some(closed_at) => closed_at <= now,
      None => false,
    }
  }
}

impl fmt::Display for Period {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.key())
  }
}

/// Every period of `granularity` from the one containing `since` up to and
/// including the one containing `until`. Empty when `since > until`.
pub fn periods_between(granularity: Granularity, since: NaiveDate, until: NaiveDate) -> Vec<Period> {
  let (Some(first), Some(last)) = (
    Period::containing(granularity, since),
    Period::containing(granularity, until),
  ) else {
    return Vec::new();
  };

  let mut periods = Vec::new();
  let mut current = Some(first);
  while let Some(period) = current {
    if period > last {
      break;
    }
    periods.push(period);
    current = period.next();
  }
  periods
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn test_keys() {
    assert_eq!(Period::Year(2019).key(), "2019");
    assert_eq!(Period::Month { year: 2019, month: 7 }.key(), "2019-07");
    assert_eq!(Period::Day(date(2019, 7, 4)).key(), "2019-07-04");
  }

  #[test]
  fn test_bounds() {
    let feb = Period::Month { year: 2020, month: 2 };
    assert_eq!(feb.first_day(), date(2020, 2, 1));
    assert_eq!(feb.last_day(), date(2020, 2, 29));

    let dec = Period::Month { year: 2019, month: 12 };
    assert_eq!(dec.next(), Some(Period::Month { year: 2020, month: 1 }));
    assert_eq!(dec.last_day(), date(2019, 12, 31));

    assert_eq!(Period::Year(2021).last_day(), date(2021, 12, 31));
  }

  #[test]
  fn test_periods_between_years() {
    let periods = periods_between(Granularity::Yearly, date(2019, 3, 1), date(2021, 6, 15));
    let keys: Vec<String> = periods.iter().map(Period::key).collect();
    assert_eq!(keys, vec!["2019", "2020", "2021"]);
  }

  #[test]
  fn test_periods_between_months_crosses_year() {
    let periods = periods_between(Granularity::Monthly, date(2019, 11, 20), date(2020, 2, 1));
    let keys: Vec<String> = periods.iter().map(Period::key).collect();
    assert_eq!(keys, vec!["2019-11", "2019-12", "2020-01", "2020-02"]);
  }

  #[test]
  fn test_periods_between_empty_when_reversed() {
    assert!(periods_between(Granularity::Daily, date(2020, 1, 2), date(2020, 1, 1)).is_empty());
    assert!(periods_between(Granularity::None, date(2020, 1, 1), date(2020, 1, 2)).is_empty());
  }

  #[test]
  fn test_is_closed_respects_settle() {
    let settle = Duration::hours(24);
    let june = Period::Month { year: 2021, month: 6 };
    // June ends 2021-07-01T00:00Z; closed from 2021-07-02T00:00Z.
    let ended = date(2021, 7, 1).and_hms_opt(12, 0, 0).unwrap().and_utc();
    assert!(!june.is_closed(ended, settle));
    let later = date(2021, 7, 2).and_hms_opt(0, 0, 0).unwrap().and_utc();
    assert!(june.is_closed(later, settle));
  }
}
