use reframe_core::ConfigError;

/// Errors that can occur while framing a stream
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
  #[error("invalid framing config: {0}")]
  Config(#[from] ConfigError),
  #[error("buffered {buffered} bytes without a separator, limit is {limit}")]
  Overflow { buffered: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, FramingError>;
