//! Byte accumulator for delimiter framing.
//!
//! Transport chunks are appended at the tail and records are split off the
//! head, so consumed bytes are never visible again. The backing `BytesMut`
//! reclaims consumed space on later appends.

use bytes::{Buf, Bytes, BytesMut};
use reframe_core::{ConfigError, FramingConfig};

use crate::error::{FramingError, Result};

/// Non-empty byte sequence that separates records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
  bytes: Bytes,
}

impl Delimiter {
  pub fn new(bytes: impl Into<Bytes>) -> std::result::Result<Self, ConfigError> {
    let bytes = bytes.into();
    if bytes.is_empty() {
      return Err(ConfigError::EmptySeparator);
    }
    Ok(Self { bytes })
  }

  /// Encode the configured separator with the configured encoding
  pub fn from_config(config: &FramingConfig) -> std::result::Result<Self, ConfigError> {
    Self::new(config.delimiter_bytes()?)
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  /// Always false; kept alongside `len` for clippy
  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  fn find_in(&self, haystack: &[u8]) -> Option<usize> {
    match self.bytes.as_ref() {
      [byte] => haystack.iter().position(|b| b == byte),
      needle => haystack.windows(needle.len()).position(|window| window == needle),
    }
  }

  fn rfind_in(&self, haystack: &[u8]) -> Option<usize> {
    match self.bytes.as_ref() {
      [byte] => haystack.iter().rposition(|b| b == byte),
      needle => haystack.windows(needle.len()).rposition(|window| window == needle),
    }
  }
}

/// Append-only buffer of transport bytes awaiting framing.
#[derive(Debug)]
pub struct ByteAccumulator {
  buf: BytesMut,
  delimiter: Delimiter,
  /// No delimiter starts before this offset of the unread region
  scan_from: usize,
  limit: Option<usize>,
  /// Start of the partial record after the last buffered delimiter. Only
  /// tracked when a limit is set.
  tail_from: usize,
  appended: u64,
  consumed: u64,
}

impl ByteAccumulator {
  pub fn new(delimiter: Delimiter) -> Self {
    Self {
      buf: BytesMut::new(),
      delimiter,
      scan_from: 0,
      limit: None,
      tail_from: 0,
      appended: 0,
      consumed: 0,
    }
  }

  /// Reject appends that would leave more than `limit` bytes buffered
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }

  pub fn delimiter(&self) -> &Delimiter {
    &self.delimiter
  }

  /// Add a chunk at the tail.
  ///
  /// With a limit set, the chunk is refused as a whole when it would leave more
  /// than `limit` bytes after the last delimiter; nothing is appended in that
  /// case. Complete records waiting to be drained do not count.
  pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
    if let Some(limit) = self.limit {
      // a delimiter may straddle the old end of the buffer
      let overlap = self.delimiter.len() - 1;
      let search_from = self.tail_from.max(self.buf.len().saturating_sub(overlap));
      let old_len = self.buf.len();
      self.buf.extend_from_slice(chunk);

      let tail_from = match self.delimiter.rfind_in(&self.buf[search_from..]) {
        Some(pos) => search_from + pos + self.delimiter.len(),
        None => self.tail_from,
      };
      let buffered = self.buf.len() - tail_from;
      if buffered > limit {
        self.buf.truncate(old_len);
        return Err(FramingError::Overflow { buffered, limit });
      }
      self.tail_from = tail_from;
    } else {
      self.buf.extend_from_slice(chunk);
    }
    self.appended += chunk.len() as u64;
    Ok(())
  }

  fn consume_head(&mut self, len: usize) {
    self.consumed += len as u64;
    self.scan_from = 0;
    self.tail_from = self.tail_from.saturating_sub(len);
  }

  /// Offset of the first delimiter in the unread region, if a complete record
  /// is buffered.
  ///
  /// A failed scan remembers how far it got, so a long partial record is not
  /// rescanned from its start on every call.
  pub fn find_delimiter(&mut self) -> Option<usize> {
    let start = self.scan_from.min(self.buf.len());
    match self.delimiter.find_in(&self.buf[start..]) {
      Some(pos) => Some(start + pos),
      None => {
        self.scan_from = self.buf.len().saturating_sub(self.delimiter.len() - 1);
        None
      }
    }
  }

  /// Split off the first `offset` unread bytes.
  pub fn take_record(&mut self, offset: usize) -> Bytes {
    let offset = offset.min(self.buf.len());
    self.consume_head(offset);
    self.buf.split_to(offset).freeze()
  }

  /// Advance past a delimiter at the head of the unread region.
  pub fn skip_delimiter(&mut self, len: usize) {
    let len = len.min(self.buf.len());
    self.consume_head(len);
    self.buf.advance(len);
  }

  /// Everything still unread, leaving the accumulator empty
  pub fn take_remaining(&mut self) -> Bytes {
    let len = self.buf.len();
    self.take_record(len)
  }

  /// Drop everything still unread, returning how many bytes were dropped
  pub fn discard_all(&mut self) -> usize {
    let len = self.buf.len();
    self.skip_delimiter(len);
    len
  }

  pub fn unread_count(&self) -> usize {
    self.buf.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buf.is_empty()
  }

  /// Total bytes ever appended (stats)
  pub fn appended_bytes(&self) -> u64 {
    self.appended
  }

  /// Total bytes ever consumed, delimiters included (stats)
  pub fn consumed_bytes(&self) -> u64 {
    self.consumed
  }
}
