//! Stream controller: turns transport chunks into delimited records.
//!
//! One controller owns one accumulator, one drain scheduler and one transport,
//! and runs as a single task. Chunk delivery, drain ticks and abort requests are
//! all handled by that task's `select!` loop, so none of them ever interleave
//! and the buffer needs no lock.
//!
//! ```text
//! Active --(transport closed, buffer drained, no abort)--> Completed
//! Active --(abort / overflow / transport failure)--------> Cancelled
//! ```
//!
//! Both terminal paths go through `cleanup`, which runs once: it destroys the
//! scheduler and the transport, drops any unread bytes and publishes the final
//! state. Abort always wins over a completion that has not been declared yet.

use std::sync::atomic::{AtomicU64, Ordering};

use reframe_core::{FramingConfig, TrailingPolicy};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
  accumulator::{ByteAccumulator, Delimiter},
  error::{FramingError, Result},
  event::{CancelReason, StreamEvent, StreamEvents},
  scheduler::DrainScheduler,
  transport::{Transport, TransportEvent},
};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
  Active,
  Completed,
  Cancelled(CancelReason),
}

impl ControllerState {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, ControllerState::Active)
  }
}

/// How the transport side ended
#[derive(Debug)]
enum Closed {
  Graceful,
  Failed(String),
}

/// Caller side of a running controller.
///
/// Cheap to clone. Dropping every handle does not stop the session.
#[derive(Clone, Debug)]
pub struct StreamHandle {
  session: u64,
  abort: CancellationToken,
  state: watch::Receiver<ControllerState>,
}

impl StreamHandle {
  pub fn session(&self) -> u64 {
    self.session
  }

  /// Request cancellation and return immediately.
  ///
  /// Idempotent, and a no-op once the session is done.
  pub fn abort(&self) {
    self.abort.cancel();
  }

  /// True once cleanup has run
  pub fn is_done(&self) -> bool {
    self.state.borrow().is_terminal()
  }

  pub fn state(&self) -> ControllerState {
    self.state.borrow().clone()
  }

  /// Wait for the session to reach a terminal state
  pub async fn finished(&self) -> ControllerState {
    let mut state = self.state.clone();
    if let Ok(terminal) = state.wait_for(ControllerState::is_terminal).await {
      return terminal.clone();
    }
    // controller task went away without cleanup (panic or runtime shutdown)
    state.borrow().clone()
  }
}

pub struct StreamController<T> {
  session: u64,
  transport: Option<T>,
  accumulator: ByteAccumulator,
  scheduler: DrainScheduler,
  trailing: TrailingPolicy,
  events: mpsc::UnboundedSender<StreamEvent>,
  state: watch::Sender<ControllerState>,
  abort: CancellationToken,
  closed: Option<Closed>,
  done: bool,
  records: u64,
}

impl<T: Transport> StreamController<T> {
  /// Build a controller without starting it.
  ///
  /// Fails on an invalid config before touching the transport; no events are
  /// emitted in that case. Must be called within a tokio runtime.
  pub fn new(transport: T, config: &FramingConfig) -> Result<(Self, StreamHandle, StreamEvents)> {
    config.validate()?;
    let delimiter = Delimiter::from_config(config)?;

    let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ControllerState::Active);
    let abort = CancellationToken::new();

    let controller = Self {
      session,
      transport: Some(transport),
      accumulator: ByteAccumulator::new(delimiter).with_limit(config.buffer_limit()),
      scheduler: DrainScheduler::new(config.loop_interval()),
      trailing: config.trailing,
      events: events_tx,
      state: state_tx,
      abort: abort.clone(),
      closed: None,
      done: false,
      records: 0,
    };

    let handle = StreamHandle {
      session,
      abort,
      state: state_rx,
    };

    Ok((controller, handle, StreamEvents::new(events_rx)))
  }

  /// Build a controller and run it on its own task
  pub fn spawn(transport: T, config: &FramingConfig) -> Result<(StreamHandle, StreamEvents)> {
    let (controller, handle, events) = Self::new(transport, config)?;
    tokio::spawn(controller.run());
    Ok((handle, events))
  }

  /// Run until the session reaches a terminal state.
  pub async fn run(mut self) -> ControllerState {
    debug!(
      session = self.session,
      delimiter_len = self.accumulator.delimiter().len(),
      interval_ms = self.scheduler.period().as_millis() as u64,
      "Stream controller started"
    );

    while !self.done {
      tokio::select! {
          biased;

          _ = self.abort.cancelled() => {
              self.cancel(CancelReason::Aborted);
          }

          _ = self.scheduler.tick() => {
              self.on_tick();
          }

          event = next_event(&mut self.transport), if self.closed.is_none() => {
              self.on_transport_event(event);
          }
      }
    }

    let state = self.state.borrow().clone();
    debug!(
      session = self.session,
      records = self.records,
      bytes = self.accumulator.appended_bytes(),
      state = ?state,
      "Stream controller stopped"
    );
    state
  }

  fn on_transport_event(&mut self, event: TransportEvent) {
    match event {
      TransportEvent::Chunk(chunk) => {
        trace!(session = self.session, len = chunk.len(), "Chunk received");
        if let Err(FramingError::Overflow { buffered, limit }) = self.accumulator.append(&chunk) {
          warn!(session = self.session, buffered, limit, "Buffer limit exceeded, cancelling");
          // records completed before the oversized one still go out
          self.drain_pass();
          self.cancel(CancelReason::Overflow { limit });
        }
      }
      TransportEvent::Closed => {
        debug!(
          session = self.session,
          unread = self.accumulator.unread_count(),
          "Transport closed, draining"
        );
        self.closed = Some(Closed::Graceful);
      }
      TransportEvent::Failed(message) => {
        warn!(
          session = self.session,
          unread = self.accumulator.unread_count(),
          error = %message,
          "Transport failed, draining"
        );
        self.closed = Some(Closed::Failed(message));
      }
    }
  }

  fn on_tick(&mut self) {
    let emitted = self.drain_pass();
    if emitted > 0 {
      trace!(session = self.session, records = emitted, unread = self.accumulator.unread_count(), "Drain pass");
    }

    // A pending abort is handled on the next loop turn and wins over completion
    if self.done || self.closed.is_none() || self.scheduler.is_destroyed() || self.abort.is_cancelled() {
      return;
    }

    if !self.accumulator.is_empty() {
      self.flush_trailing();
    }
    if self.accumulator.is_empty() {
      self.finish();
    }
  }

  /// Emit every complete record currently buffered.
  ///
  /// The abort token is checked between records, so an abort from another
  /// thread lets at most the record in progress through.
  fn drain_pass(&mut self) -> usize {
    let accumulator = &mut self.accumulator;
    let events = &self.events;
    let abort = &self.abort;

    let emitted = self.scheduler.run_pass(|scheduler| {
      let mut emitted = 0;
      loop {
        if abort.is_cancelled() {
          scheduler.destroy();
          break;
        }
        let Some(offset) = accumulator.find_delimiter() else {
          break;
        };
        let record = accumulator.take_record(offset);
        accumulator.skip_delimiter(accumulator.delimiter().len());
        // receiver gone only means nobody is listening
        let _ = events.send(StreamEvent::Data(record));
        emitted += 1;
      }
      emitted
    });

    self.records += emitted as u64;
    emitted
  }

  /// Handle bytes left after close that no separator will ever complete
  fn flush_trailing(&mut self) {
    match self.trailing {
      TrailingPolicy::Emit => {
        let record = self.accumulator.take_remaining();
        debug!(session = self.session, len = record.len(), "Emitting trailing record");
        let _ = self.events.send(StreamEvent::Data(record));
        self.records += 1;
      }
      TrailingPolicy::Discard => {
        let dropped = self.accumulator.discard_all();
        debug!(session = self.session, dropped, "Discarding trailing bytes");
      }
    }
  }

  fn finish(&mut self) {
    if self.done {
      return;
    }
    let terminal = match self.closed.take() {
      Some(Closed::Failed(message)) => ControllerState::Cancelled(CancelReason::Transport(message)),
      _ => ControllerState::Completed,
    };
    let event = match &terminal {
      ControllerState::Cancelled(reason) => StreamEvent::Cancelled(reason.clone()),
      _ => StreamEvent::Completed,
    };
    let _ = self.events.send(event);
    self.cleanup(terminal);
  }

  fn cancel(&mut self, reason: CancelReason) {
    if self.done {
      return;
    }
    debug!(session = self.session, reason = %reason, "Stream cancelled");
    let _ = self.events.send(StreamEvent::Cancelled(reason.clone()));
    self.cleanup(ControllerState::Cancelled(reason));
  }

  fn cleanup(&mut self, terminal: ControllerState) {
    if self.done {
      return;
    }
    self.done = true;
    self.scheduler.destroy();
    if let Some(mut transport) = self.transport.take() {
      transport.destroy();
    }
    let dropped = self.accumulator.discard_all();
    if dropped > 0 {
      debug!(session = self.session, dropped, "Discarded unread bytes");
    }
    self.state.send_replace(terminal);
  }
}

async fn next_event<T: Transport>(transport: &mut Option<T>) -> TransportEvent {
  match transport {
    Some(transport) => transport.next_event().await,
    None => std::future::pending().await,
  }
}
