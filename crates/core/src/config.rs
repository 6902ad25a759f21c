//! Configuration system for reframe with per-project overrides.
//!
//! Config priority: explicit path > project-relative (.reframe.toml) > user (~/.config/reframe/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::encoding::TextEncoding;
use crate::error::{ConfigError, Result};

pub const PROJECT_CONFIG_FILE: &str = ".reframe.toml";

// ============================================================================
// Framing Configuration
// ============================================================================

/// What happens to bytes still buffered after the transport closes when no
/// further separator exists in them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrailingPolicy {
  /// Deliver them as one final record
  #[default]
  Emit,
  /// Drop them
  Discard,
}

/// Record framing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
  /// Record separator, encoded with `encoding` before matching (default: "\r\n")
  pub separator: String,

  /// Encoding used to turn `separator` into bytes (default: utf8)
  pub encoding: TextEncoding,

  /// Drain pass interval in milliseconds (default: 10)
  pub loop_interval_ms: u64,

  /// Maximum bytes buffered without a separator before the session is
  /// cancelled (0 = unbounded, default: 16 MiB)
  pub max_buffered_bytes: usize,

  /// Handling of trailing bytes at end of stream (default: emit)
  pub trailing: TrailingPolicy,
}

impl Default for FramingConfig {
  fn default() -> Self {
    Self {
      separator: "\r\n".to_string(),
      encoding: TextEncoding::Utf8,
      loop_interval_ms: 10,
      max_buffered_bytes: 16 * 1024 * 1024,
      trailing: TrailingPolicy::Emit,
    }
  }
}

impl FramingConfig {
  /// Config with the given separator and defaults for everything else
  pub fn with_separator(separator: impl Into<String>) -> Self {
    Self {
      separator: separator.into(),
      ..Default::default()
    }
  }

  /// The separator as the byte sequence searched for in the stream.
  ///
  /// Fails when the encoded separator is empty or the separator is not valid
  /// in the configured encoding.
  pub fn delimiter_bytes(&self) -> Result<Vec<u8>> {
    let bytes = self.encoding.encode(&self.separator)?;
    if bytes.is_empty() {
      return Err(ConfigError::EmptySeparator);
    }
    Ok(bytes)
  }

  pub fn loop_interval(&self) -> Duration {
    Duration::from_millis(self.loop_interval_ms)
  }

  /// Buffer ceiling, `None` when unbounded
  pub fn buffer_limit(&self) -> Option<usize> {
    (self.max_buffered_bytes > 0).then_some(self.max_buffered_bytes)
  }

  /// Check everything that can be checked before a session starts
  pub fn validate(&self) -> Result<()> {
    if self.loop_interval_ms == 0 {
      return Err(ConfigError::InvalidInterval);
    }
    self.delimiter_bytes().map(|_| ())
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "warn"
  #[serde(default = "default_log_level")]
  pub level: String,

  /// Also write logs to this file (default: stderr only)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub log_file: Option<PathBuf>,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "never"
  #[serde(default = "default_log_rotation")]
  pub rotation: String,
}

fn default_log_level() -> String {
  "warn".to_string()
}
fn default_log_rotation() -> String {
  "never".to_string()
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      log_file: None,
      rotation: default_log_rotation(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub framing: FramingConfig,
  pub logging: LoggingConfig,
}

impl Config {
  /// Load config from an explicit file. Unlike the lookup chain, a missing or
  /// malformed file is an error here.
  pub fn load_from(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load config for a project, with fallback to user config
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(content) = std::fs::read_to_string(&project_config)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(content) = std::fs::read_to_string(&user_config_path)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    Self::default()
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("REFRAME_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("reframe").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("reframe").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(PROJECT_CONFIG_FILE)
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    r#"# reframe configuration
# Place in .reframe.toml (project) or ~/.config/reframe/config.toml (user)

[framing]
# Record separator and the encoding used to turn it into bytes
# (utf8, utf16le, latin1, ascii, hex, base64)
separator = "\r\n"
encoding = "utf8"

# How often buffered bytes are scanned for complete records
loop_interval_ms = 10

# Cancel the session when this many bytes accumulate without a separator
# (0 = unbounded)
max_buffered_bytes = 16777216

# What to do with bytes left after the stream ends without a final separator:
# "emit" delivers them as a last record, "discard" drops them
trailing = "emit"

[logging]
# off, error, warn, info, debug, trace (RUST_LOG overrides)
level = "warn"
# log_file = "/tmp/reframe.log"
# rotation = "daily"
"#
    .to_string()
  }
}
