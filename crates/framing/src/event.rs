//! Events emitted by a stream controller

use bytes::Bytes;
use tokio::sync::mpsc;

/// Why a session ended without completing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
  /// `abort()` was called
  Aborted,
  /// The buffer ceiling was hit before a separator arrived
  Overflow { limit: usize },
  /// The transport reported a failure instead of closing
  Transport(String),
}

impl std::fmt::Display for CancelReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CancelReason::Aborted => write!(f, "aborted"),
      CancelReason::Overflow { limit } => write!(f, "buffer exceeded {} bytes without a separator", limit),
      CancelReason::Transport(message) => write!(f, "transport failed: {}", message),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
  /// One record, separator excluded. May be empty.
  Data(Bytes),
  /// Transport closed and every buffered byte was handled
  Completed,
  /// Session ended early; remaining bytes were discarded
  Cancelled(CancelReason),
}

impl StreamEvent {
  /// Whether this is the last event of the session
  pub fn is_terminal(&self) -> bool {
    !matches!(self, StreamEvent::Data(_))
  }
}

/// Receiving side of a session's events.
///
/// Yields data records in stream order followed by exactly one terminal event,
/// then `None`.
#[derive(Debug)]
pub struct StreamEvents {
  rx: mpsc::UnboundedReceiver<StreamEvent>,
}

/// All records of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedStream {
  pub records: Vec<Bytes>,
  /// `None` only if the controller went away without terminating
  pub terminal: Option<StreamEvent>,
}

impl CollectedStream {
  pub fn is_completed(&self) -> bool {
    self.terminal == Some(StreamEvent::Completed)
  }

  pub fn cancel_reason(&self) -> Option<&CancelReason> {
    match &self.terminal {
      Some(StreamEvent::Cancelled(reason)) => Some(reason),
      _ => None,
    }
  }
}

impl StreamEvents {
  pub(crate) fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
    Self { rx }
  }

  pub async fn recv(&mut self) -> Option<StreamEvent> {
    self.rx.recv().await
  }

  /// Drain the session until its terminal event
  pub async fn collect(mut self) -> CollectedStream {
    let mut records = Vec::new();
    while let Some(event) = self.rx.recv().await {
      match event {
        StreamEvent::Data(record) => records.push(record),
        terminal => {
          return CollectedStream {
            records,
            terminal: Some(terminal),
          };
        }
      }
    }
    CollectedStream { records, terminal: None }
  }
}
