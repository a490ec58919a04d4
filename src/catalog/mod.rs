//! The resource catalog: every queryable resource and how it is partitioned.
//!
//! The orchestrator iterates over the catalog; adding a trackable resource
//! means adding a row here (or in the config file), not new control flow.

mod fitbit;
mod period;
mod template;

use serde::Deserialize;
use std::collections::HashSet;

pub use period::{periods_between, Granularity, Period};
pub use template::{Placeholder, TemplateParams, UrlTemplate};

use crate::error::{Result, SyncError};

/// One catalog row.
#[derive(Debug, Clone)]
pub struct Resource {
  pub name: String,
  pub template: UrlTemplate,
  pub granularity: Granularity,
}

impl Resource {
  pub fn new(name: &str, template: &str, granularity: Granularity) -> Result<Self> {
    let template = UrlTemplate::parse(template)?;

    if granularity.is_calendar() && !template.uses_dates() {
      return Err(SyncError::Catalog(format!(
        "{} is {} but its URL has no date placeholder",
        name, granularity
      )));
    }
    if !granularity.is_calendar() && template.uses_dates() {
      return Err(SyncError::Catalog(format!(
        "{} has no granularity but its URL uses a date placeholder",
        name
      )));
    }

    Ok(Self {
      name: name.to_string(),
      template,
      granularity,
    })
  }

  /// Whether the URL is keyed by the resolved account id.
  pub fn user_scoped(&self) -> bool {
    self.template.uses(Placeholder::UserId)
  }
}

/// A catalog row as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRow {
  pub name: String,
  pub url: String,
  #[serde(default = "default_granularity")]
  pub granularity: Granularity,
}

fn default_granularity() -> Granularity {
  Granularity::None
}

/// Which resource establishes the identity, and where to find it in the payload.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProbe {
  pub resource: String,
  /// JSON pointer to the remote account id.
  pub account_pointer: String,
  /// JSON pointer to the `YYYY-MM-DD` date the history starts at.
  pub since_pointer: String,
}

/// Validated, immutable resource table.
#[derive(Debug, Clone)]
pub struct Catalog {
  resources: Vec<Resource>,
  probe: IdentityProbe,
}

impl Catalog {
  pub fn new(resources: Vec<Resource>, probe: IdentityProbe) -> Result<Self> {
    let mut seen = HashSet::new();
    for resource in &resources {
      if !seen.insert(resource.name.as_str()) {
        return Err(SyncError::Catalog(format!(
          "duplicate resource name {}",
          resource.name
        )));
      }
    }

    let probe_resource = resources
      .iter()
      .find(|r| r.name == probe.resource)
      .ok_or_else(|| {
        SyncError::Catalog(format!("identity resource {} is not in the catalog", probe.resource))
      })?;
    if probe_resource.granularity.is_calendar() || probe_resource.user_scoped() {
      return Err(SyncError::Catalog(format!(
        "identity resource {} must be ungranular and not keyed by user id",
        probe.resource
      )));
    }
    for pointer in [&probe.account_pointer, &probe.since_pointer] {
      if !pointer.starts_with('/') {
        return Err(SyncError::Catalog(format!("{} is not a JSON pointer", pointer)));
      }
    }

    Ok(Self { resources, probe })
  }

  /// Build a catalog from config rows.
  pub fn from_rows(rows: &[ResourceRow], probe: IdentityProbe) -> Result<Self> {
    let resources = rows
      .iter()
      .map(|row| Resource::new(&row.name, &row.url, row.granularity))
      .collect::<Result<Vec<_>>>()?;
    Self::new(resources, probe)
  }

  /// The built-in Fitbit table.
  pub fn fitbit() -> Result<Self> {
    fitbit::catalog()
  }

  pub fn resources(&self) -> &[Resource] {
    &self.resources
  }

  pub fn probe(&self) -> &IdentityProbe {
    &self.probe
  }

  pub fn get(&self, name: &str) -> Option<&Resource> {
    self.resources.iter().find(|r| r.name == name)
  }

  /// Ungranular resources, identity probe first, then catalog order.
  pub fn ungranular(&self) -> Vec<&Resource> {
    let mut out: Vec<&Resource> = self
      .resources
      .iter()
      .filter(|r| !r.granularity.is_calendar())
      .collect();
    out.sort_by_key(|r| r.name != self.probe.resource);
    out
  }

  /// Calendar resources in catalog order.
  pub fn calendar(&self) -> impl Iterator<Item = &Resource> {
    self.resources.iter().filter(|r| r.granularity.is_calendar())
  }
}
