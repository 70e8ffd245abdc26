//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "feedcache.log";

fn default_filter(level: &str) -> Result<EnvFilter> {
  EnvFilter::try_new(level).map_err(|e| eyre!("Invalid log level {:?}: {}", level, e))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. With a log
/// directory configured, output goes to a daily rolling file through a
/// background writer; keep the returned guard alive until exit so buffered
/// lines are flushed. Otherwise output goes to stderr.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => default_filter(&config.level)?,
  };
  let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

  match &config.directory {
    Some(directory) => {
      std::fs::create_dir_all(directory)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;
      let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      builder
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      builder
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(None)
    }
  }
}
