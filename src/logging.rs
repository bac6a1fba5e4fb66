//! Tracing subscriber setup: stderr plus an optional daily rolling file.

use color_eyre::{eyre::eyre, Result};
use std::ffi::OsStr;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LogConfig;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "FOLIO_LOG";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole run.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log filter {:?}: {}", config.level, e))?;

  let stderr = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false);
  let registry = Registry::default().with(filter).with(stderr);

  match &config.file {
    Some(path) => {
      let (dir, prefix) = split_log_path(path);
      let appender = tracing_appender::rolling::daily(dir, prefix);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

      registry
        .with(file)
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      registry
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(None)
    }
  }
}

/// Directory and file-name prefix for the rolling appender.
fn split_log_path(path: &Path) -> (&Path, &OsStr) {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  let prefix = path.file_name().unwrap_or_else(|| OsStr::new("folio.log"));
  (dir, prefix)
}
