use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use fitsync::cache::{CacheLayer, NoopStorage, ResponseStore, SqliteStorage};
use fitsync::config::Config;
use fitsync::driver::{FileOutputStore, Runner};
use fitsync::ratelimit::{RateLimiter, SqliteBudget};
use fitsync::remote::{EnvToken, HttpApi};
use fitsync::{SyncEngine, SyncOutcome};

#[derive(Parser, Debug)]
#[command(name = "fitsync")]
#[command(about = "Incremental, rate-limited export of Fitbit history")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./fitsync.yaml, then $XDG_CONFIG_HOME/fitsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log at debug level unless RUST_LOG says otherwise
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sync one identity, waiting out rate limits until done
  Sync {
    /// Whose data to sync; names the output file and the rate-limit realm
    #[arg(short, long)]
    identity: String,

    /// Run a single round and report instead of waiting
    #[arg(long)]
    once: bool,

    /// Never reuse or record cached responses
    #[arg(long)]
    no_cache: bool,
  },
  /// Maintain the response cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
  /// List the configured resources
  Catalog,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Remove responses older than the given age
  Expire {
    #[arg(long, default_value_t = 30)]
    days: i64,
  },
  /// Remove every cached response
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = fitsync::logging::init(config.logging.dir.as_deref(), args.verbose)?;

  match args.command {
    Command::Sync {
      identity,
      once,
      no_cache,
    } => {
      if no_cache {
        sync(&config, NoopStorage, &identity, once).await
      } else {
        let path = config.cache_path()?;
        let storage = SqliteStorage::open(&path)
          .map_err(|e| eyre!("Failed to open cache {}: {}", path.display(), e))?;
        sync(&config, storage, &identity, once).await
      }
    }
    Command::Cache { action } => cache(&config, action),
    Command::Catalog => catalog(&config),
  }
}

async fn sync<S: ResponseStore>(config: &Config, storage: S, identity: &str, once: bool) -> Result<()> {
  let db_path = config.cache_path()?;
  let budget = SqliteBudget::open(&db_path)
    .map_err(|e| eyre!("Failed to open rate limit store {}: {}", db_path.display(), e))?;
  let limiter = RateLimiter::new(budget, config.global_quota(), config.per_identity_quota());
  let api = HttpApi::new(&config.api.base_url)
    .map_err(|e| eyre!("Failed to create API client: {}", e))?;

  let engine = SyncEngine::new(
    config.catalog()?,
    api,
    CacheLayer::new(storage).with_policy(config.trust_policy()),
    limiter,
  )
  .with_settings(config.sync_settings());

  let outputs = FileOutputStore::new(config.output_dir()?);
  let path = outputs.path_for(identity);
  let runner = Runner::new(engine, EnvToken, outputs, config.max_countdown());

  if !once {
    let output = runner
      .run(identity)
      .await
      .map_err(|e| eyre!("Sync failed for {}: {}", identity, e))?;
    println!(
      "complete: {} resources, {} periods -> {}",
      output.resources.len(),
      output.period_count(),
      path.display()
    );
    return Ok(());
  }

  match runner
    .round(identity)
    .await
    .map_err(|e| eyre!("Sync failed for {}: {}", identity, e))?
  {
    SyncOutcome::Merged(output) => println!(
      "complete: {} resources, {} periods -> {}",
      output.resources.len(),
      output.period_count(),
      path.display()
    ),
    SyncOutcome::Suspended(suspension) => println!(
      "suspended: fetched {}, resume in {}s -> {}",
      suspension.fetched,
      suspension.countdown_secs(),
      path.display()
    ),
  }
  Ok(())
}

fn cache(config: &Config, action: CacheAction) -> Result<()> {
  let path = config.cache_path()?;
  let storage =
    SqliteStorage::open(&path).map_err(|e| eyre!("Failed to open cache {}: {}", path.display(), e))?;

  match action {
    CacheAction::Expire { days } => {
      if days < 0 {
        return Err(eyre!("--days must not be negative"));
      }
      let cutoff = Utc::now() - chrono::Duration::days(days);
      let removed = storage
        .expire(cutoff)
        .map_err(|e| eyre!("Failed to expire cache: {}", e))?;
      println!("removed {} responses older than {} days", removed, days);
    }
    CacheAction::Clear => {
      let removed = storage
        .clear()
        .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
      println!("removed {} responses", removed);
    }
  }
  Ok(())
}

fn catalog(config: &Config) -> Result<()> {
  let catalog = config.catalog()?;
  let probe = &catalog.probe().resource;

  for resource in catalog.resources() {
    let marker = if &resource.name == probe { "*" } else { " " };
    println!(
      "{} {:<32} {:<8} {}",
      marker,
      resource.name,
      resource.granularity.to_string(),
      resource.template.as_str()
    );
  }
  Ok(())
}
