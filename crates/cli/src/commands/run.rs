//! `reframe run` and `reframe stdin`

use std::{process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::Args;
use exec::{CommandSpec, frame_command};
use framing::{
  CancelReason, FramingConfig, ReaderTransport, StreamController, StreamEvent, StreamEvents, StreamHandle,
  TextEncoding, TrailingPolicy,
};
use reframe_core::Config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::output::{OutputFormat, RecordWriter};

/// Exit status after Ctrl-C, as shells report SIGINT
const EXIT_INTERRUPTED: u8 = 130;

/// Framing options shared by `run` and `stdin`. Unset flags keep the
/// configured value.
#[derive(Args, Debug, Clone, Default)]
pub struct FramingArgs {
  /// Record separator; \n, \r, \t, \0 and \\ escapes are understood
  #[arg(short, long)]
  pub separator: Option<String>,
  /// Encoding used to turn the separator into bytes
  #[arg(short, long, value_name = "ENCODING")]
  pub encoding: Option<TextEncoding>,
  /// Drain interval in milliseconds
  #[arg(short, long, value_name = "MS")]
  pub interval: Option<u64>,
  /// Drop bytes left after the last separator instead of emitting them
  #[arg(long)]
  pub discard_trailing: bool,
  /// Cancel when this many bytes pile up without a separator (0 = unbounded)
  #[arg(long, value_name = "BYTES")]
  pub max_buffer: Option<usize>,
  /// Print records as JSON lines
  #[arg(long)]
  pub json: bool,
  /// Abort the session after this many seconds
  #[arg(long, value_name = "SECS")]
  pub timeout: Option<u64>,
}

impl FramingArgs {
  /// Layer the flags over `framing` and validate the result
  pub fn apply(&self, mut framing: FramingConfig) -> Result<FramingConfig> {
    if let Some(separator) = &self.separator {
      framing.separator = unescape(separator);
    }
    if let Some(encoding) = self.encoding {
      framing.encoding = encoding;
    }
    if let Some(interval) = self.interval {
      framing.loop_interval_ms = interval;
    }
    if self.discard_trailing {
      framing.trailing = TrailingPolicy::Discard;
    }
    if let Some(max) = self.max_buffer {
      framing.max_buffered_bytes = max;
    }
    framing.validate().context("invalid framing options")?;
    Ok(framing)
  }

  fn format(&self) -> OutputFormat {
    if self.json { OutputFormat::Json } else { OutputFormat::Lines }
  }
}

/// Expand backslash escapes; unknown escapes are kept as written
fn unescape(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut chars = input.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some('t') => out.push('\t'),
      Some('0') => out.push('\0'),
      Some('\\') => out.push('\\'),
      Some(other) => {
        out.push('\\');
        out.push(other);
      }
      None => out.push('\\'),
    }
  }
  out
}

/// Frame a command's stdout
pub async fn cmd_run(config: Config, args: &FramingArgs, argv: Vec<String>) -> Result<ExitCode> {
  let framing = args.apply(config.framing)?;
  let spec = CommandSpec::from_argv(argv)?;

  let (handle, events) =
    frame_command(&spec, &framing).with_context(|| format!("failed to start {}", spec.program))?;
  info!(session = handle.session(), program = %spec.program, "Framing command output");

  drive(handle, events, args).await
}

/// Frame standard input
pub async fn cmd_stdin(config: Config, args: &FramingArgs) -> Result<ExitCode> {
  let framing = args.apply(config.framing)?;

  let (handle, events) = StreamController::spawn(ReaderTransport::new(tokio::io::stdin()), &framing)?;
  info!(session = handle.session(), "Framing standard input");

  drive(handle, events, args).await
}

/// Print records until the session ends and map the outcome to an exit code
async fn drive(handle: StreamHandle, mut events: StreamEvents, args: &FramingArgs) -> Result<ExitCode> {
  let interrupted = abort_on_interrupt(&handle);
  if let Some(secs) = args.timeout {
    let handle = handle.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_secs(secs)).await;
      if !handle.is_done() {
        warn!(timeout_secs = secs, "Timed out, aborting");
        handle.abort();
      }
    });
  }

  let mut writer = RecordWriter::new(tokio::io::stdout(), args.format());
  let mut terminal = None;
  while let Some(event) = events.recv().await {
    match event {
      StreamEvent::Data(record) => {
        if let Err(e) = writer.write_record(&record).await {
          handle.abort();
          return Err(e).context("failed to write record");
        }
      }
      event => {
        terminal = Some(event);
        break;
      }
    }
  }

  let written = writer.written();
  writer.finish().await.context("failed to flush output")?;
  debug!(session = handle.session(), records = written, "Session finished");

  Ok(match terminal {
    Some(StreamEvent::Completed) => ExitCode::SUCCESS,
    Some(StreamEvent::Cancelled(CancelReason::Aborted)) if interrupted.is_cancelled() => {
      ExitCode::from(EXIT_INTERRUPTED)
    }
    Some(StreamEvent::Cancelled(reason)) => {
      warn!(reason = %reason, records = written, "Session cancelled");
      ExitCode::FAILURE
    }
    _ => {
      warn!("Session ended without a terminal event");
      ExitCode::FAILURE
    }
  })
}

/// Abort the session on Ctrl-C. The returned token is cancelled once that
/// happened.
fn abort_on_interrupt(handle: &StreamHandle) -> CancellationToken {
  let interrupted = CancellationToken::new();
  let flag = interrupted.clone();
  let handle = handle.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("Interrupted, aborting");
      flag.cancel();
      handle.abort();
    }
  });
  interrupted
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_unescape() {
    assert_eq!(unescape("\\r\\n"), "\r\n");
    assert_eq!(unescape("a\\tb"), "a\tb");
    assert_eq!(unescape("\\\\"), "\\");
    assert_eq!(unescape("\\x"), "\\x");
    assert_eq!(unescape("end\\"), "end\\");
    assert_eq!(unescape("<END>"), "<END>");
  }

  #[test]
  fn test_apply_keeps_unset_values() {
    let base = FramingConfig {
      separator: "|".to_string(),
      loop_interval_ms: 25,
      ..Default::default()
    };
    let applied = FramingArgs::default().apply(base.clone()).unwrap();
    assert_eq!(applied, base);
  }

  #[test]
  fn test_apply_overrides() {
    let args = FramingArgs {
      separator: Some("\\n".to_string()),
      encoding: Some(TextEncoding::Latin1),
      interval: Some(5),
      discard_trailing: true,
      max_buffer: Some(0),
      ..Default::default()
    };
    let applied = args.apply(FramingConfig::default()).unwrap();

    assert_eq!(applied.separator, "\n");
    assert_eq!(applied.encoding, TextEncoding::Latin1);
    assert_eq!(applied.loop_interval_ms, 5);
    assert_eq!(applied.trailing, TrailingPolicy::Discard);
    assert_eq!(applied.buffer_limit(), None);
  }

  #[test]
  fn test_apply_rejects_invalid() {
    let empty = FramingArgs {
      separator: Some(String::new()),
      ..Default::default()
    };
    assert!(empty.apply(FramingConfig::default()).is_err());

    let zero = FramingArgs {
      interval: Some(0),
      ..Default::default()
    };
    assert!(zero.apply(FramingConfig::default()).is_err());
  }

  #[test]
  fn test_output_format() {
    let args = FramingArgs {
      json: true,
      ..Default::default()
    };
    assert_eq!(args.format(), OutputFormat::Json);
    assert_eq!(FramingArgs::default().format(), OutputFormat::Lines);
  }
}
