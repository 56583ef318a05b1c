//! Typed error surface of the sink.
//!
//! Validation failures are returned synchronously to the caller. Failures
//! inside an async dispatch body never reach the original caller; they are
//! converted into a [`StreamEvent::Error`](crate::sink::events::StreamEvent)
//! instead.

use thiserror::Error;

/// Errors returned by sink operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// No media type has been negotiated yet.
    #[error("media type not set")]
    NotInitialized,

    /// The operation is not legal in the sink's current state.
    #[error("operation invalid in the current state")]
    InvalidRequest,

    /// The media type is not compatible with this sink.
    #[error("invalid media type")]
    InvalidType,

    /// The sink has been shut down.
    #[error("sink is shut down")]
    Shutdown,

    /// A queue submission or allocation failed.
    #[error("resource failure: {0}")]
    Resource(String),

    /// A stream sink with this identifier already exists.
    #[error("stream sink already exists")]
    StreamExists,

    /// No stream sink matches this identifier or index.
    #[error("no such stream sink")]
    StreamNotFound,

    /// The presentation clock requested a transition this sink does not
    /// support.
    #[error("unsupported clock state transition")]
    UnsupportedTransition,
}

pub type SinkResult<T> = Result<T, SinkError>;
