//! End-to-end tests for the stream controller over in-memory transports.

use std::time::Duration;

use bytes::Bytes;
use framing::{
  CancelReason, CollectedStream, ControllerState, FramingConfig, FramingError, ReaderTransport, StreamController,
  StreamEvent, StreamEvents, TextEncoding, TrailingPolicy, channel,
};
use pretty_assertions::assert_eq;
use reframe_core::ConfigError;
use tokio::time::{Instant, sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

fn config(separator: &str) -> FramingConfig {
  FramingConfig {
    separator: separator.to_string(),
    loop_interval_ms: 2,
    ..Default::default()
  }
}

fn records(items: &[&str]) -> Vec<Bytes> {
  items.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
}

/// Feed `chunks`, close, and collect everything the controller emits
async fn frame(chunks: &[&[u8]], config: &FramingConfig) -> CollectedStream {
  let (feed, transport) = channel();
  let (_handle, events) = StreamController::spawn(transport, config).expect("valid config");
  for chunk in chunks {
    feed.chunk(Bytes::copy_from_slice(chunk));
  }
  feed.close();
  timeout(WAIT, events.collect()).await.expect("session should finish")
}

/// Every event until the controller drops its sender
async fn all_events(mut events: StreamEvents) -> Vec<StreamEvent> {
  let mut out = Vec::new();
  while let Some(event) = timeout(WAIT, events.recv()).await.expect("controller should stop") {
    out.push(event);
  }
  out
}

fn terminal_count(events: &[StreamEvent]) -> usize {
  events.iter().filter(|e| e.is_terminal()).count()
}

// ==========================================================================
// Framing
// ==========================================================================

#[tokio::test]
async fn test_records_are_split_in_order() {
  let input = "alpha\r\n\r\nbeta gamma\r\nδ\r\n";
  let collected = frame(&[input.as_bytes()], &config("\r\n")).await;

  assert_eq!(collected.records, records(&["alpha", "", "beta gamma", "δ"]));
  assert!(collected.is_completed());
}

#[tokio::test]
async fn test_chunking_does_not_change_output() {
  let input: &[u8] = b"first\r\nsecond\r\n\r\nthird record\r\n";
  let expected = frame(&[input], &config("\r\n")).await;
  assert_eq!(expected.records.len(), 4);

  // every two-way split, including ones inside a separator
  for split in 1..input.len() {
    let (a, b) = input.split_at(split);
    let collected = frame(&[a, b], &config("\r\n")).await;
    assert_eq!(collected, expected, "split at {}", split);
  }

  // one byte at a time
  let bytes: Vec<&[u8]> = input.chunks(1).collect();
  assert_eq!(frame(&bytes, &config("\r\n")).await, expected);
}

#[tokio::test]
async fn test_multi_byte_separator_split_across_slow_chunks() {
  let (feed, transport) = channel();
  let (_handle, events) = StreamController::spawn(transport, &config("<END>")).unwrap();

  for chunk in ["one<E", "N", "D>tw", "o<END", ">"] {
    feed.chunk(chunk.to_string());
    sleep(Duration::from_millis(5)).await;
  }
  feed.close();

  let collected = timeout(WAIT, events.collect()).await.unwrap();
  assert_eq!(collected.records, records(&["one", "two"]));
  assert!(collected.is_completed());
}

#[tokio::test]
async fn test_utf16_separator() {
  let cfg = FramingConfig {
    encoding: TextEncoding::Utf16le,
    ..config("\n")
  };
  let input: Vec<u8> = "ab\ncd\n".encode_utf16().flat_map(u16::to_le_bytes).collect();

  let collected = frame(&[input.as_slice()], &cfg).await;
  let expected: Vec<Bytes> = ["ab", "cd"]
    .iter()
    .map(|s| Bytes::from(s.encode_utf16().flat_map(u16::to_le_bytes).collect::<Vec<u8>>()))
    .collect();
  assert_eq!(collected.records, expected);
}

#[tokio::test]
async fn test_reader_transport_end_to_end() {
  let transport = ReaderTransport::with_chunk_size(&b"one\ntwo\nthree"[..], 3);
  let (_handle, events) = StreamController::spawn(transport, &config("\n")).unwrap();

  let collected = timeout(WAIT, events.collect()).await.unwrap();
  assert_eq!(collected.records, records(&["one", "two", "three"]));
  assert!(collected.is_completed());
}

// ==========================================================================
// Trailing data
// ==========================================================================

#[tokio::test]
async fn test_trailing_bytes_emitted_before_completion() {
  let started = Instant::now();
  let collected = frame(&[&b"a\r\nbc"[..]], &config("\r\n")).await;

  assert_eq!(collected.records, records(&["a", "bc"]));
  assert!(collected.is_completed());
  assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_trailing_bytes_discarded_by_policy() {
  let cfg = FramingConfig {
    trailing: TrailingPolicy::Discard,
    ..config("\r\n")
  };
  let collected = frame(&[&b"a\r\nbc"[..]], &cfg).await;

  assert_eq!(collected.records, records(&["a"]));
  assert!(collected.is_completed());
}

#[tokio::test]
async fn test_close_with_empty_buffer_completes() {
  let collected = frame(&[], &config("\n")).await;
  assert!(collected.records.is_empty());
  assert!(collected.is_completed());
}

// ==========================================================================
// Termination
// ==========================================================================

#[tokio::test]
async fn test_empty_separator_rejected_without_events() {
  let (feed, transport) = channel();
  let result = StreamController::spawn(transport, &config(""));

  assert!(matches!(result, Err(FramingError::Config(ConfigError::EmptySeparator))));
  // the transport was dropped, never driven
  assert!(feed.is_destroyed());
}

#[tokio::test]
async fn test_abort_before_first_byte() {
  let (feed, transport) = channel();
  let (handle, events) = StreamController::spawn(transport, &config("\n")).unwrap();
  handle.abort();

  let events = all_events(events).await;
  assert_eq!(events, vec![StreamEvent::Cancelled(CancelReason::Aborted)]);
  assert!(handle.is_done());
  assert!(feed.is_destroyed());
}

#[tokio::test]
async fn test_double_abort_emits_once() {
  let (feed, transport) = channel();
  let (handle, events) = StreamController::spawn(transport, &config("\n")).unwrap();
  feed.chunk("x\n");
  sleep(Duration::from_millis(20)).await;

  handle.abort();
  handle.abort();
  handle.clone().abort();

  let events = all_events(events).await;
  assert_eq!(terminal_count(&events), 1);
  assert_eq!(events.last(), Some(&StreamEvent::Cancelled(CancelReason::Aborted)));
  assert_eq!(handle.finished().await, ControllerState::Cancelled(CancelReason::Aborted));
}

#[tokio::test]
async fn test_abort_after_completion_is_noop() {
  let (feed, transport) = channel();
  let (handle, events) = StreamController::spawn(transport, &config("\n")).unwrap();
  feed.chunk("done\n");
  feed.close();

  assert_eq!(timeout(WAIT, handle.finished()).await.unwrap(), ControllerState::Completed);
  handle.abort();
  handle.abort();

  let events = all_events(events).await;
  assert_eq!(events, vec![StreamEvent::Data(Bytes::from_static(b"done")), StreamEvent::Completed]);
  assert_eq!(handle.state(), ControllerState::Completed);
}

#[tokio::test]
async fn test_abort_after_close_suppresses_completion() {
  // Long interval: close is seen well before the first drain tick
  let cfg = FramingConfig {
    loop_interval_ms: 500,
    ..config("\n")
  };
  let (feed, transport) = channel();
  let (handle, events) = StreamController::spawn(transport, &cfg).unwrap();
  feed.chunk("complete\npartial");
  feed.close();
  sleep(Duration::from_millis(50)).await;
  assert!(!handle.is_done());

  handle.abort();

  let events = all_events(events).await;
  assert!(!events.contains(&StreamEvent::Completed));
  assert_eq!(events, vec![StreamEvent::Cancelled(CancelReason::Aborted)]);
}

#[tokio::test]
async fn test_run_in_place_reports_terminal_state() {
  let (feed, transport) = channel();
  let (controller, handle, events) = StreamController::new(transport, &config("|")).unwrap();
  feed.chunk("a|b|");
  feed.close();

  let state = timeout(WAIT, controller.run()).await.unwrap();
  assert_eq!(state, ControllerState::Completed);
  assert!(handle.is_done());
  assert_eq!(events.collect().await.records, records(&["a", "b"]));
}

#[tokio::test]
async fn test_done_flips_with_cleanup() {
  let (feed, transport) = channel();
  let (handle, _events) = StreamController::spawn(transport, &config("\n")).unwrap();
  assert!(!handle.is_done());
  assert_eq!(handle.state(), ControllerState::Active);

  feed.close();
  assert_eq!(timeout(WAIT, handle.finished()).await.unwrap(), ControllerState::Completed);
  assert!(handle.is_done());
}

// ==========================================================================
// Failures
// ==========================================================================

#[tokio::test]
async fn test_overflow_cancels_session() {
  let cfg = FramingConfig {
    max_buffered_bytes: 8,
    ..config("\n")
  };
  let (feed, transport) = channel();
  let (handle, events) = StreamController::spawn(transport, &cfg).unwrap();
  feed.chunk("0123456789");

  let events = all_events(events).await;
  assert_eq!(events, vec![StreamEvent::Cancelled(CancelReason::Overflow { limit: 8 })]);
  assert!(handle.is_done());
  assert!(feed.is_destroyed());
}

#[tokio::test]
async fn test_limit_does_not_count_complete_records() {
  let cfg = FramingConfig {
    max_buffered_bytes: 8,
    ..config("\n")
  };
  let collected = frame(&[&b"ab\ncd\nef\n"[..]], &cfg).await;

  assert_eq!(collected.records, records(&["ab", "cd", "ef"]));
  assert!(collected.is_completed());
}

#[tokio::test]
async fn test_partial_record_under_limit_keeps_earlier_records() {
  let cfg = FramingConfig {
    max_buffered_bytes: 8,
    loop_interval_ms: 200,
    ..config("\n")
  };
  let (feed, transport) = channel();
  let (_handle, events) = StreamController::spawn(transport, &cfg).unwrap();
  feed.chunk("a\nb\n");
  feed.chunk("cccccc");
  feed.close();

  let collected = timeout(WAIT, events.collect()).await.unwrap();
  assert_eq!(collected.records, records(&["a", "b", "cccccc"]));
  assert!(collected.is_completed());
}

#[tokio::test]
async fn test_overflow_delivers_records_completed_before_it() {
  let cfg = FramingConfig {
    max_buffered_bytes: 8,
    loop_interval_ms: 500,
    ..config("\n")
  };
  let (feed, transport) = channel();
  let (_handle, events) = StreamController::spawn(transport, &cfg).unwrap();
  feed.chunk("ok\n");
  feed.chunk("0123456789");

  let events = all_events(events).await;
  assert_eq!(
    events,
    vec![
      StreamEvent::Data(Bytes::from_static(b"ok")),
      StreamEvent::Cancelled(CancelReason::Overflow { limit: 8 }),
    ]
  );
}

#[tokio::test]
async fn test_transport_failure_delivers_buffered_records() {
  let (feed, transport) = channel();
  let (handle, events) = StreamController::spawn(transport, &config("\n")).unwrap();
  feed.chunk("x\ny");
  feed.fail("connection reset");

  let collected = timeout(WAIT, events.collect()).await.unwrap();
  assert_eq!(collected.records, records(&["x", "y"]));
  assert_eq!(
    collected.cancel_reason(),
    Some(&CancelReason::Transport("connection reset".to_string()))
  );
  assert_eq!(
    handle.finished().await,
    ControllerState::Cancelled(CancelReason::Transport("connection reset".to_string()))
  );
}
