pub mod config;
pub mod encoding;
pub mod error;

pub use config::{Config, FramingConfig, LoggingConfig, PROJECT_CONFIG_FILE, TrailingPolicy};
pub use encoding::TextEncoding;
pub use error::{ConfigError, Result};
