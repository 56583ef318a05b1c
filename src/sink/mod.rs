//! Stream sink core.
//!
//! This module implements the hand-off of captured frames across an
//! asynchronous boundary, organized as:
//! - Control/Coordination: lifecycle state machine with a validated
//!   state×operation matrix
//! - Data Transport: the FIFO sample queue and the lifecycle-event channel
//! - Dispatch: one serialized work queue per stream sink; operations
//!   execute strictly in submission order
//! - Ownership: a media sink owning exactly one stream sink, bridging the
//!   presentation clock
//!
//! # Control flow
//!
//! Clock or driver calls land on the [`MediaSink`], forward to the
//! [`StreamSink`], are validated against the state matrix, queued as async
//! operations and dispatched serially. A dispatch either emits a lifecycle
//! event or pulls the next queued item and invokes the delivery callback,
//! then asks for more input. The sink pulls one sample at a time
//! (request-sample backpressure) rather than letting producers flood it.

pub mod dispatcher;
pub mod events;
pub mod media;
pub mod queue;
pub mod state;
pub mod stream;

pub use dispatcher::SerialDispatcher;
pub use events::{EventReceiver, StreamEvent};
pub use media::{MediaSink, SinkCallback, SinkCharacteristics, FIXED_STREAM_ID};
pub use queue::{QueueItem, SampleQueue};
pub use state::{StreamOperation, StreamState};
pub use stream::{StartPosition, StreamSink};
