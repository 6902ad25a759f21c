//! Record output for the CLI

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
  /// Raw record bytes, one record per line
  Lines,
  /// One JSON object per line
  Json,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
  index: u64,
  record: &'a str,
}

/// Render one record, newline included
pub fn format_record(format: OutputFormat, index: u64, record: &[u8]) -> Vec<u8> {
  let mut out = match format {
    OutputFormat::Lines => record.to_vec(),
    OutputFormat::Json => {
      let text = String::from_utf8_lossy(record);
      // serializing a borrowed str and an integer cannot fail
      serde_json::to_vec(&JsonRecord { index, record: &text }).unwrap_or_default()
    }
  };
  out.push(b'\n');
  out
}

/// Writes records in order, counting them
pub struct RecordWriter<W> {
  out: W,
  format: OutputFormat,
  written: u64,
}

impl<W: AsyncWrite + Unpin> RecordWriter<W> {
  pub fn new(out: W, format: OutputFormat) -> Self {
    Self { out, format, written: 0 }
  }

  pub async fn write_record(&mut self, record: &[u8]) -> std::io::Result<()> {
    let line = format_record(self.format, self.written, record);
    self.out.write_all(&line).await?;
    self.written += 1;
    Ok(())
  }

  pub fn written(&self) -> u64 {
    self.written
  }

  pub async fn finish(mut self) -> std::io::Result<W> {
    self.out.flush().await?;
    Ok(self.out)
  }
}
