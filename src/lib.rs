//! framesink: delivers captured video frames from a capture pipeline
//! into a downstream media-processing pipeline across an asynchronous
//! boundary.
//!
//! The crate exposes a stream-sink contract a host media framework can
//! drive through its own state machine: lifecycle transitions validated
//! against a state×operation matrix, thread-safe sample queueing, serial
//! async dispatch to a consumer callback, deferred mid-stream format
//! changes ordered against in-flight samples, and clean idempotent
//! shutdown from any state.
//!
//! Device enumeration, capability listing and device-change notification
//! are external collaborators reached through the interfaces in
//! [`devices`]; the core decides only *how* captured samples are handed
//! off, never *what* to capture.

pub mod clock;
pub mod devices;
pub mod error;
pub mod frame;
pub mod sink;

pub use clock::{ClockObserver, PresentationClock};
pub use error::{SinkError, SinkResult};
pub use frame::{MediaFrame, MediaKind, PixelFormat, Timestamp, VideoFormat};
pub use sink::{
    EventReceiver, MediaSink, SinkCallback, SinkCharacteristics, StartPosition, StreamEvent,
    StreamOperation, StreamSink, StreamState, FIXED_STREAM_ID,
};
