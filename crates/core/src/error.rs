use std::path::PathBuf;

use thiserror::Error;

use crate::encoding::TextEncoding;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("separator must not be empty")]
  EmptySeparator,

  #[error("separator is not valid {encoding}: {reason}")]
  InvalidSeparator { encoding: TextEncoding, reason: String },

  #[error("unknown encoding: {0}")]
  UnknownEncoding(String),

  #[error("loop interval must be at least 1ms")]
  InvalidInterval,

  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
