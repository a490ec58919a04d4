use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::TrustPolicy;
use crate::catalog::{Catalog, IdentityProbe, ResourceRow};
use crate::db::Database;
use crate::ratelimit::Quota;
use crate::sync::SyncSettings;

pub const FITBIT_API_BASE: &str = "https://api.fitbit.com/1/user";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub rate_limits: RateLimitsConfig,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub output: OutputConfig,
  pub logging: LoggingConfig,
  /// Replaces the built-in Fitbit resource table when set
  pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: FITBIT_API_BASE.to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct QuotaConfig {
  pub max_requests: u32,
  #[serde(default = "default_window_secs")]
  pub window_secs: u64,
}

fn default_window_secs() -> u64 {
  3600
}

impl QuotaConfig {
  fn to_quota(self) -> Quota {
    Quota {
      max_requests: self.max_requests,
      window: Duration::from_secs(self.window_secs),
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
  /// Shared by every identity using this API client
  pub global: QuotaConfig,
  /// One budget per identity
  pub per_identity: QuotaConfig,
}

impl Default for RateLimitsConfig {
  fn default() -> Self {
    Self {
      global: QuotaConfig {
        max_requests: 3600,
        window_secs: 3600,
      },
      per_identity: QuotaConfig {
        max_requests: 150,
        window_secs: 3600,
      },
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub max_age_days: i64,
  /// Database file for cached responses and rate budgets
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_age_days: 7,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Hours after a period ends before it counts as closed
  pub settle_hours: i64,
  /// Most recent closed periods per resource that are fetched again every run
  pub refetch_recent_periods: usize,
  pub suspend_countdown_secs: u64,
  /// Cap for the countdown when rounds stop making progress
  pub max_countdown_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      settle_hours: 24,
      refetch_recent_periods: 0,
      suspend_countdown_secs: 60,
      max_countdown_secs: 3600,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
  /// Where per-identity output files are written
  pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Directory for a daily-rolling log file; stderr only when unset
  pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
  pub identity: IdentityProbe,
  pub resources: Vec<ResourceRow>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fitsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fitsync/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("fitsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fitsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file means "all defaults".
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  fn validate(&self) -> Result<()> {
    for (name, quota) in [
      ("global", self.rate_limits.global),
      ("per_identity", self.rate_limits.per_identity),
    ] {
      if quota.max_requests == 0 || quota.window_secs == 0 {
        return Err(eyre!(
          "rate_limits.{} needs a positive max_requests and window_secs",
          name
        ));
      }
    }
    if self.cache.max_age_days < 0 {
      return Err(eyre!("cache.max_age_days must not be negative"));
    }
    if self.sync.settle_hours < 0 {
      return Err(eyre!("sync.settle_hours must not be negative"));
    }
    if self.sync.max_countdown_secs < self.sync.suspend_countdown_secs {
      return Err(eyre!(
        "sync.max_countdown_secs must be at least sync.suspend_countdown_secs"
      ));
    }
    Ok(())
  }

  pub fn global_quota(&self) -> Quota {
    self.rate_limits.global.to_quota()
  }

  pub fn per_identity_quota(&self) -> Quota {
    self.rate_limits.per_identity.to_quota()
  }

  pub fn trust_policy(&self) -> TrustPolicy {
    TrustPolicy {
      max_age: chrono::Duration::days(self.cache.max_age_days),
      settle: chrono::Duration::hours(self.sync.settle_hours),
    }
  }

  pub fn sync_settings(&self) -> SyncSettings {
    SyncSettings {
      suspend_countdown: Duration::from_secs(self.sync.suspend_countdown_secs),
      refetch_recent_periods: self.sync.refetch_recent_periods,
    }
  }

  pub fn max_countdown(&self) -> Duration {
    Duration::from_secs(self.sync.max_countdown_secs)
  }

  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(path) => Ok(path.clone()),
      None => Database::default_path().map_err(|e| eyre!("Failed to locate cache database: {}", e)),
    }
  }

  pub fn output_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.output.dir {
      return Ok(dir.clone());
    }
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;
    Ok(data_dir.join("fitsync").join("output"))
  }

  /// The configured resource table, or the built-in Fitbit one.
  pub fn catalog(&self) -> Result<Catalog> {
    let catalog = match &self.catalog {
      Some(custom) => Catalog::from_rows(&custom.resources, custom.identity.clone()),
      None => Catalog::fitbit(),
    };
    catalog.map_err(|e| eyre!("Failed to build resource catalog: {}", e))
  }
}
