//! Tracing subscriber setup for the binary.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "fitsync=info";
const VERBOSE_FILTER: &str = "fitsync=debug";

/// `RUST_LOG` when set, otherwise our own crate at info (debug when verbose).
fn env_filter(verbose: bool) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    EnvFilter::new(if verbose {
      VERBOSE_FILTER
    } else {
      DEFAULT_FILTER
    })
  })
}

/// Install the global subscriber: stderr always, plus a daily-rolling file in
/// `log_dir` when given. Hold the returned guard until exit so the file writer
/// flushes.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
  let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

  let Some(dir) = log_dir else {
    tracing_subscriber::registry()
      .with(env_filter(verbose))
      .with(stderr)
      .try_init()
      .map_err(|e| eyre!("Failed to init logging: {}", e))?;
    return Ok(None);
  };

  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "fitsync.log"));

  tracing_subscriber::registry()
    .with(env_filter(verbose))
    .with(stderr)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to init logging: {}", e))?;
  Ok(Some(guard))
}
