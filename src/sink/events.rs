//! Lifecycle-event channel between a stream sink and its host framework.

use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::{SinkError, SinkResult};

/// Events emitted by a stream sink, delivered in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Streaming started (also emitted on restart)
    Started,
    /// Streaming stopped; queued samples were discarded
    Stopped,
    /// Delivery suspended; queued samples are kept
    Paused,
    /// The sink wants one more sample. At most one request is outstanding;
    /// producers push only in response (pull-based backpressure).
    RequestSample,
    /// A failure inside an async dispatch body
    Error { reason: String },
}

/// Sink-side end of the event channel.
///
/// Emission stays ordered because every event goes through the single
/// dispatcher or through API calls holding the sink mutex. Shutting the
/// queue down drops the sender; the host can still drain events emitted
/// before shutdown, then the channel ends.
pub(crate) struct EventQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<StreamEvent>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<StreamEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Emit an event. Fails once the queue has been shut down.
    pub fn emit(&self, event: StreamEvent) -> SinkResult<()> {
        match self.tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).map_err(|_| SinkError::Shutdown),
            None => Err(SinkError::Shutdown),
        }
    }

    /// Take the host's end of the channel. Available exactly once.
    pub fn take_receiver(&self) -> Option<EventReceiver> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .map(|rx| EventReceiver { rx })
    }

    /// Close the channel. Further emissions fail; already-queued events
    /// remain retrievable.
    pub fn shutdown(&self) {
        self.tx.lock().unwrap().take();
    }
}

/// Host-side end of the lifecycle-event channel.
///
/// `recv` blocks until the next event; it must never be called while
/// holding a lock of the owning sink.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl EventReceiver {
    /// Wait for the next event. Returns `None` once the sink is shut down
    /// and all pending events have been drained.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll for the next event.
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }
}
