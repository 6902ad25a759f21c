//! Delimiter-based record framing over chunked byte transports
//!
//! A [`StreamController`] consumes a [`Transport`] that delivers bytes in
//! arbitrary fragments and emits one [`StreamEvent::Data`] per separator-
//! terminated record, followed by exactly one terminal event.
//!
//! ```text
//! transport chunk → ByteAccumulator::append
//!                 → (drain tick) find_delimiter / take_record / skip_delimiter → Data
//! transport close → drain remaining → trailing policy → Completed
//! abort()         → Cancelled
//! ```
//!
//! Drain passes run on a fixed interval rather than on chunk arrival, so
//! delivery latency is bounded by the configured `loop_interval_ms`.

pub mod accumulator;
pub mod controller;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod transport;

pub use accumulator::{ByteAccumulator, Delimiter};
pub use controller::{ControllerState, StreamController, StreamHandle};
pub use error::{FramingError, Result};
pub use event::{CancelReason, CollectedStream, StreamEvent, StreamEvents};
pub use reframe_core::{FramingConfig, TextEncoding, TrailingPolicy};
pub use scheduler::{DrainScheduler, SchedulerState};
pub use transport::{
  ChannelTransport, DEFAULT_CHUNK_SIZE, ReaderTransport, Transport, TransportEvent, TransportFeed, channel,
};
