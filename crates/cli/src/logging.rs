//! Logging setup for the reframe binary
//!
//! Records go to stdout, so logs never do: they are written to stderr, or to
//! the configured log file instead.

use std::path::Path;

use reframe_core::LoggingConfig;
use tracing::level_filters::LevelFilter;
use tracing_appender::{non_blocking::WorkerGuard, rolling::RollingFileAppender};
use tracing_subscriber::EnvFilter;

/// Parse log level from config string
fn parse_log_level(level: &str) -> LevelFilter {
  match level.to_lowercase().as_str() {
    "off" => LevelFilter::OFF,
    "error" => LevelFilter::ERROR,
    "warn" => LevelFilter::WARN,
    "info" => LevelFilter::INFO,
    "debug" => LevelFilter::DEBUG,
    "trace" => LevelFilter::TRACE,
    _ => LevelFilter::WARN,
  }
}

fn file_appender(path: &Path, rotation: &str) -> Option<RollingFileAppender> {
  let dir = match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  let file_name = path.file_name()?;
  std::fs::create_dir_all(dir).ok()?;

  Some(match rotation {
    "hourly" => tracing_appender::rolling::hourly(dir, file_name),
    "daily" => tracing_appender::rolling::daily(dir, file_name),
    _ => tracing_appender::rolling::never(dir, file_name),
  })
}

/// Initialize logging from config.
///
/// `verbose` raises the level to debug. RUST_LOG overrides both.
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
  let level = if verbose {
    LevelFilter::DEBUG
  } else {
    parse_log_level(&config.level)
  };

  // Build env filter (allows RUST_LOG override)
  let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

  if let Some(path) = &config.log_file
    && let Some(appender) = file_appender(path, &config.rotation)
  {
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_ansi(false)
      .with_writer(file_writer)
      .init();
    return Some(guard);
  }

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
  None
}
