//! Built-in Fitbit resource table.

use super::{Catalog, Granularity, IdentityProbe, Resource};
use crate::error::Result;

use Granularity::{Monthly, Yearly};

const ROWS: &[(&str, &str, Granularity)] = &[
  // general user data
  ("profile", "/-/profile.json", Granularity::None),
  ("devices", "/-/devices.json", Granularity::None),
  ("activities-overview", "/{user_id}/activities.json", Granularity::None),
  // interday time series
  ("heart", "/{user_id}/activities/heart/date/{start}/{end}.json", Monthly),
  (
    "tracker-activity-calories",
    "/{user_id}/activities/tracker/activityCalories/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-calories",
    "/{user_id}/activities/tracker/calories/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-distance",
    "/{user_id}/activities/tracker/distance/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-elevation",
    "/{user_id}/activities/tracker/elevation/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-floors",
    "/{user_id}/activities/tracker/floors/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-minutes-fairly-active",
    "/{user_id}/activities/tracker/minutesFairlyActive/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-minutes-lightly-active",
    "/{user_id}/activities/tracker/minutesLightlyActive/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-minutes-sedentary",
    "/{user_id}/activities/tracker/minutesSedentary/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-minutes-very-active",
    "/{user_id}/activities/tracker/minutesVeryActive/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "tracker-steps",
    "/{user_id}/activities/tracker/steps/date/{start}/{end}.json",
    Yearly,
  ),
  ("weight-log", "/{user_id}/body/log/weight/date/{start}/{end}.json", Monthly),
  ("weight", "/{user_id}/body/weight/date/{start}/{end}.json", Yearly),
  (
    "sleep-awakenings",
    "/{user_id}/sleep/awakeningsCount/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "sleep-efficiency",
    "/{user_id}/sleep/efficiency/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "sleep-minutes-after-wakeup",
    "/{user_id}/sleep/minutesAfterWakeup/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "sleep-minutes",
    "/{user_id}/sleep/minutesAsleep/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "awake-minutes",
    "/{user_id}/sleep/minutesAwake/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "minutes-to-sleep",
    "/{user_id}/sleep/minutesToFallAsleep/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "sleep-start-time",
    "/{user_id}/sleep/startTime/date/{start}/{end}.json",
    Yearly,
  ),
  (
    "time-in-bed",
    "/{user_id}/sleep/timeInBed/date/{start}/{end}.json",
    Yearly,
  ),
];

/// Fitbit's profile carries both the encoded account id and the signup date.
pub(super) fn probe() -> IdentityProbe {
  IdentityProbe {
    resource: "profile".to_string(),
    account_pointer: "/user/encodedId".to_string(),
    since_pointer: "/user/memberSince".to_string(),
  }
}

pub(super) fn catalog() -> Result<Catalog> {
  let resources = ROWS
    .iter()
    .map(|(name, url, granularity)| Resource::new(name, url, *granularity))
    .collect::<Result<Vec<_>>>()?;
  Catalog::new(resources, probe())
}
