//! Transport contract consumed by the stream controller.
//!
//! A transport delivers byte chunks of arbitrary size and eventually reports
//! that it closed (or failed). The controller never writes to a transport; it
//! only reads events and may destroy it.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
  io::{AsyncRead, AsyncReadExt},
  sync::mpsc,
};

/// Default read size for reader-backed transports
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
  /// Raw bytes, no framing implied
  Chunk(Bytes),
  /// The remote side finished producing output
  Closed,
  /// The transport broke; no more chunks will arrive
  Failed(String),
}

impl TransportEvent {
  pub fn is_final(&self) -> bool {
    !matches!(self, TransportEvent::Chunk(_))
  }
}

/// Source of byte chunks for one session.
///
/// After `next_event` returns a final event it is not polled again.
#[async_trait]
pub trait Transport: Send + 'static {
  /// Wait for the next event. Must be cancel safe: dropping the future before
  /// it resolves must not lose data.
  async fn next_event(&mut self) -> TransportEvent;

  /// Forcibly terminate the transport. Called at most once.
  fn destroy(&mut self);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
  async fn next_event(&mut self) -> TransportEvent {
    (**self).next_event().await
  }

  fn destroy(&mut self) {
    (**self).destroy()
  }
}

// ============================================================================
// Channel Transport
// ============================================================================

/// Create an in-memory transport and the feed that drives it
pub fn channel() -> (TransportFeed, ChannelTransport) {
  let (tx, rx) = mpsc::unbounded_channel();
  (TransportFeed { tx }, ChannelTransport { rx })
}

/// Push side of a [`ChannelTransport`].
///
/// Cheap to clone. Dropping every feed without calling `close` reads as a
/// close on the transport side.
#[derive(Clone, Debug)]
pub struct TransportFeed {
  tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportFeed {
  /// Deliver a chunk. Returns false once the transport was destroyed.
  pub fn chunk(&self, bytes: impl Into<Bytes>) -> bool {
    self.tx.send(TransportEvent::Chunk(bytes.into())).is_ok()
  }

  pub fn close(&self) -> bool {
    self.tx.send(TransportEvent::Closed).is_ok()
  }

  pub fn fail(&self, message: impl Into<String>) -> bool {
    self.tx.send(TransportEvent::Failed(message.into())).is_ok()
  }

  /// True once the receiving transport was destroyed or dropped
  pub fn is_destroyed(&self) -> bool {
    self.tx.is_closed()
  }
}

#[derive(Debug)]
pub struct ChannelTransport {
  rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl Transport for ChannelTransport {
  async fn next_event(&mut self) -> TransportEvent {
    self.rx.recv().await.unwrap_or(TransportEvent::Closed)
  }

  fn destroy(&mut self) {
    self.rx.close();
  }
}

// ============================================================================
// Reader Transport
// ============================================================================

/// Transport over any `AsyncRead`: each successful read becomes one chunk and
/// end of file becomes `Closed`.
#[derive(Debug)]
pub struct ReaderTransport<R> {
  reader: Option<R>,
  buf: BytesMut,
  chunk_size: usize,
}

impl<R> ReaderTransport<R>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  pub fn new(reader: R) -> Self {
    Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
  }

  pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
    Self {
      reader: Some(reader),
      buf: BytesMut::new(),
      chunk_size: chunk_size.max(1),
    }
  }
}

#[async_trait]
impl<R> Transport for ReaderTransport<R>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  async fn next_event(&mut self) -> TransportEvent {
    let Some(reader) = self.reader.as_mut() else {
      return TransportEvent::Closed;
    };

    self.buf.reserve(self.chunk_size);
    let mut limited = (&mut self.buf).limit(self.chunk_size);
    match reader.read_buf(&mut limited).await {
      Ok(0) => {
        self.reader = None;
        TransportEvent::Closed
      }
      Ok(_) => TransportEvent::Chunk(self.buf.split().freeze()),
      Err(e) => {
        self.reader = None;
        TransportEvent::Failed(e.to_string())
      }
    }
  }

  fn destroy(&mut self) {
    self.reader = None;
  }
}
