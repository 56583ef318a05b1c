//! Stream sink lifecycle state and operation validation.

use crate::error::{SinkError, SinkResult};

/// Lifecycle state of a stream sink
///
/// Driven by media-type negotiation and presentation-clock transitions.
/// The state only changes through operations validated against
/// [`VALID_STATE_MATRIX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamState {
    /// No media type negotiated yet
    NotSet,

    /// A media type is set; streaming has not started
    Ready,

    /// The presentation clock started; samples flow
    Started,

    /// Delivery is suspended; queued samples are kept for resume
    Paused,

    /// The presentation clock stopped
    Stopped,
}

/// Operations a caller can request on a stream sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOperation {
    SetMediaType,
    Start,
    Restart,
    Pause,
    Stop,
    ProcessSample,
}

/// Matrix of operations vs states. If an entry is true, the operation is
/// valid from that state.
const VALID_STATE_MATRIX: [[bool; 6]; 5] = [
    // States:   Operations:
    //           SetType Start  Restart Pause  Stop   Sample
    /* NotSet */ [true, false, false, false, false, false],
    /* Ready */ [true, true, false, true, true, false],
    /* Started */ [true, true, false, true, true, true],
    /* Paused */ [true, true, true, true, true, true],
    /* Stopped */ [true, true, false, false, true, false],
];

impl StreamState {
    /// Check if an operation is valid in this state.
    ///
    /// A rejected operation fails with [`SinkError::NotInitialized`] before
    /// a media type has been set, [`SinkError::InvalidRequest`] afterwards.
    pub fn validate(&self, op: StreamOperation) -> SinkResult<()> {
        if VALID_STATE_MATRIX[*self as usize][op as usize] {
            Ok(())
        } else if *self == StreamState::NotSet {
            Err(SinkError::NotInitialized)
        } else {
            Err(SinkError::InvalidRequest)
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            StreamState::NotSet => "NotSet",
            StreamState::Ready => "Ready",
            StreamState::Started => "Started",
            StreamState::Paused => "Paused",
            StreamState::Stopped => "Stopped",
        }
    }

    /// Check if the sink is in an active streaming state
    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamState::Started | StreamState::Paused)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
