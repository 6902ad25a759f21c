//! Text encodings used to turn a configured separator string into bytes.
//!
//! Only the separator is ever encoded. Stream data is matched as raw bytes and
//! never decoded, so a record that is not valid text in the chosen encoding is
//! still delivered unchanged.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
  #[default]
  #[serde(alias = "utf-8")]
  Utf8,
  #[serde(alias = "utf-16le", alias = "ucs2", alias = "ucs-2")]
  Utf16le,
  #[serde(alias = "binary")]
  Latin1,
  Ascii,
  Hex,
  Base64,
}

impl TextEncoding {
  pub fn as_str(&self) -> &'static str {
    match self {
      TextEncoding::Utf8 => "utf8",
      TextEncoding::Utf16le => "utf16le",
      TextEncoding::Latin1 => "latin1",
      TextEncoding::Ascii => "ascii",
      TextEncoding::Hex => "hex",
      TextEncoding::Base64 => "base64",
    }
  }

  /// Encode `text` into the byte sequence that is searched for in the stream.
  ///
  /// `latin1` and `ascii` keep the low byte of each code point, so characters
  /// outside the single-byte range collapse rather than fail.
  pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
    match self {
      TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
      TextEncoding::Utf16le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
      TextEncoding::Latin1 | TextEncoding::Ascii => Ok(text.chars().map(|c| (c as u32 & 0xff) as u8).collect()),
      TextEncoding::Hex => hex::decode(text).map_err(|e| ConfigError::InvalidSeparator {
        encoding: *self,
        reason: e.to_string(),
      }),
      TextEncoding::Base64 => base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| ConfigError::InvalidSeparator {
          encoding: *self,
          reason: e.to_string(),
        }),
    }
  }
}

impl std::fmt::Display for TextEncoding {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for TextEncoding {
  type Err = ConfigError;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
      "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Ok(TextEncoding::Utf16le),
      "latin1" | "binary" => Ok(TextEncoding::Latin1),
      "ascii" => Ok(TextEncoding::Ascii),
      "hex" => Ok(TextEncoding::Hex),
      "base64" => Ok(TextEncoding::Base64),
      other => Err(ConfigError::UnknownEncoding(other.to_string())),
    }
  }
}
