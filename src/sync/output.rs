//! The merged, persisted result for one identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;

/// Data for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ResourceData {
  /// Ungranular resource: one payload.
  Single(Value),
  /// Calendar resource: payload per period key.
  Periodic(BTreeMap<String, Value>),
}

/// Everything synced so far for one identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOutput {
  /// Remote account id the data belongs to.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub account: Option<String>,
  #[serde(default)]
  pub resources: BTreeMap<String, ResourceData>,
  /// Period keys per resource that were recorded after their period closed.
  /// Only these are final; anything else may still change remotely.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub complete: BTreeMap<String, BTreeSet<String>>,
}

impl SyncOutput {
  pub fn for_account(account: impl Into<String>) -> Self {
    Self {
      account: Some(account.into()),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.resources.is_empty()
  }

  pub fn single(&self, resource: &str) -> Option<&Value> {
    match self.resources.get(resource)? {
      ResourceData::Single(value) => Some(value),
      ResourceData::Periodic(_) => None,
    }
  }

  pub fn periods(&self, resource: &str) -> Option<&BTreeMap<String, Value>> {
    match self.resources.get(resource)? {
      ResourceData::Periodic(periods) => Some(periods),
      ResourceData::Single(_) => None,
    }
  }

  pub fn period(&self, resource: &str, key: &str) -> Option<&Value> {
    self.periods(resource)?.get(key)
  }

  pub fn set_single(&mut self, resource: &str, value: Value) {
    self
      .resources
      .insert(resource.to_string(), ResourceData::Single(value));
  }

  /// Insert a period payload, replacing a single payload stored under the same name.
  /// The period is not complete until [`SyncOutput::mark_complete`] says so.
  pub fn set_period(&mut self, resource: &str, key: &str, value: Value) {
    self.unmark_complete(resource, key);
    let entry = self
      .resources
      .entry(resource.to_string())
      .or_insert_with(|| ResourceData::Periodic(BTreeMap::new()));
    if let ResourceData::Single(_) = entry {
      *entry = ResourceData::Periodic(BTreeMap::new());
    }
    if let ResourceData::Periodic(periods) = entry {
      periods.insert(key.to_string(), value);
    }
  }

  pub fn is_complete(&self, resource: &str, key: &str) -> bool {
    self
      .complete
      .get(resource)
      .is_some_and(|keys| keys.contains(key))
  }

  pub fn mark_complete(&mut self, resource: &str, key: &str) {
    self
      .complete
      .entry(resource.to_string())
      .or_default()
      .insert(key.to_string());
  }

  fn unmark_complete(&mut self, resource: &str, key: &str) {
    if let Some(keys) = self.complete.get_mut(resource) {
      keys.remove(key);
      if keys.is_empty() {
        self.complete.remove(resource);
      }
    }
  }

  pub fn remove_period(&mut self, resource: &str, key: &str) -> Option<Value> {
    self.unmark_complete(resource, key);
    match self.resources.get_mut(resource)? {
      ResourceData::Periodic(periods) => {
        let removed = periods.remove(key);
        if periods.is_empty() {
          self.resources.remove(resource);
        }
        removed
      }
      ResourceData::Single(_) => None,
    }
  }

  /// Count of stored period payloads across all resources.
  pub fn period_count(&self) -> usize {
    self
      .resources
      .values()
      .map(|data| match data {
        ResourceData::Periodic(periods) => periods.len(),
        ResourceData::Single(_) => 0,
      })
      .sum()
  }

  pub fn to_json_pretty(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn from_json(data: &[u8]) -> Result<Self> {
    Ok(serde_json::from_slice(data)?)
  }
}
