//! Media sink container: owns the single stream sink and bridges
//! presentation-clock lifecycle events into it.

use async_trait::async_trait;
use log::{error, info};
use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Handle;

use crate::clock::{ClockObserver, PresentationClock};
use crate::error::{SinkError, SinkResult};
use crate::frame::{MediaFrame, Timestamp, VideoFormat};
use crate::sink::stream::{StartPosition, StreamSink};

/// Consumer-side delivery callback.
///
/// `on_sample` runs on the sink's dispatcher task and must not block
/// indefinitely; a returned error is caught there and converted into a
/// [`StreamEvent::Error`](crate::sink::events::StreamEvent). `on_shutdown`
/// fires exactly once, when the media sink shuts down.
#[async_trait]
pub trait SinkCallback: Send + Sync {
    async fn on_sample(&self, frame: MediaFrame) -> anyhow::Result<()>;
    async fn on_shutdown(&self);
}

/// The only stream identifier this sink exposes (single-stream design).
pub const FIXED_STREAM_ID: u32 = 0;

/// Static sink properties reported to the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCharacteristics {
    /// The sink consumes samples as fast as they arrive instead of pacing
    /// delivery against the clock rate.
    Rateless,
}

struct MediaShared {
    stream: Option<StreamSink>,
    clock: Option<Arc<PresentationClock>>,
    start_time: Timestamp,
    shutdown: bool,
    notified: bool,
}

/// Container owning exactly one [`StreamSink`].
///
/// Cloning yields another handle to the same underlying sink.
#[derive(Clone)]
pub struct MediaSink {
    inner: Arc<MediaSinkInner>,
}

pub(crate) struct MediaSinkInner {
    shared: Mutex<MediaShared>,
    callback: Arc<dyn SinkCallback>,
}

impl MediaSink {
    pub fn new(callback: Arc<dyn SinkCallback>) -> Self {
        Self {
            inner: Arc::new(MediaSinkInner {
                shared: Mutex::new(MediaShared {
                    stream: None,
                    clock: None,
                    start_time: Timestamp::ZERO,
                    shutdown: false,
                    notified: false,
                }),
                callback,
            }),
        }
    }

    /// Build a sink with its single stream already added, optionally
    /// pre-seeding the negotiated media type. Must be called from within a
    /// Tokio runtime.
    pub fn with_stream(
        callback: Arc<dyn SinkCallback>,
        format: Option<&VideoFormat>,
    ) -> SinkResult<Self> {
        let sink = Self::new(callback);
        sink.add_stream(FIXED_STREAM_ID, format)?;
        Ok(sink)
    }

    pub(crate) fn from_inner(inner: Arc<MediaSinkInner>) -> Self {
        Self { inner }
    }

    pub fn characteristics(&self) -> SinkResult<SinkCharacteristics> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        Ok(SinkCharacteristics::Rateless)
    }

    /// Create and initialize the stream sink.
    ///
    /// Fails with [`SinkError::StreamExists`] when one is already present
    /// (single-stream invariant) and [`SinkError::StreamNotFound`] for any
    /// identifier other than [`FIXED_STREAM_ID`].
    pub fn add_stream(&self, id: u32, format: Option<&VideoFormat>) -> SinkResult<StreamSink> {
        let stream = {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.reject("add_stream", SinkError::Shutdown));
            }
            if id != FIXED_STREAM_ID {
                return Err(self.reject("add_stream", SinkError::StreamNotFound));
            }
            if shared.stream.is_some() {
                return Err(self.reject("add_stream", SinkError::StreamExists));
            }
            let stream = StreamSink::new(
                id,
                Arc::downgrade(&self.inner),
                Arc::clone(&self.inner.callback),
            );
            shared.stream = Some(stream.clone());
            stream
        };

        if let Some(format) = format {
            if let Err(e) = stream.set_media_type(format) {
                // Pre-seeding failed: roll the stream back out.
                stream.shutdown();
                self.inner.shared.lock().unwrap().stream = None;
                return Err(self.reject("add_stream", e));
            }
        }
        info!("media sink: stream {id} added");
        Ok(stream)
    }

    /// Shut the stream sink down and clear the slot; a later `add_stream`
    /// is legal again.
    pub fn remove_stream(&self, id: u32) -> SinkResult<()> {
        let stream = {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.reject("remove_stream", SinkError::Shutdown));
            }
            if id != FIXED_STREAM_ID {
                return Err(self.reject("remove_stream", SinkError::StreamNotFound));
            }
            shared
                .stream
                .take()
                .ok_or_else(|| self.reject("remove_stream", SinkError::StreamNotFound))?
        };
        stream.shutdown();
        info!("media sink: stream {id} removed");
        Ok(())
    }

    pub fn stream_count(&self) -> SinkResult<usize> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        Ok(usize::from(shared.stream.is_some()))
    }

    pub fn stream_by_index(&self, index: usize) -> SinkResult<StreamSink> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        if index > 0 {
            return Err(SinkError::StreamNotFound);
        }
        shared.stream.clone().ok_or(SinkError::StreamNotFound)
    }

    pub fn stream_by_id(&self, id: u32) -> SinkResult<StreamSink> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        if id != FIXED_STREAM_ID {
            return Err(SinkError::StreamNotFound);
        }
        shared.stream.clone().ok_or(SinkError::StreamNotFound)
    }

    /// Register this sink as the clock's state observer.
    ///
    /// At most one clock is registered at a time; a re-registration first
    /// deregisters from the previous clock. `None` just deregisters.
    pub fn set_presentation_clock(
        &self,
        clock: Option<Arc<PresentationClock>>,
    ) -> SinkResult<()> {
        let previous = {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.reject("set_presentation_clock", SinkError::Shutdown));
            }
            std::mem::replace(&mut shared.clock, clock.clone())
        };
        if let Some(previous) = previous {
            previous.clear_observer();
        }
        if let Some(clock) = clock {
            let observer: Weak<dyn ClockObserver> =
                Arc::<MediaSinkInner>::downgrade(&self.inner);
            clock.set_observer(observer);
        }
        Ok(())
    }

    pub fn presentation_clock(&self) -> SinkResult<Option<Arc<PresentationClock>>> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        Ok(shared.clock.clone())
    }

    /// The offset cached from the most recent clock start.
    pub fn start_time(&self) -> SinkResult<Timestamp> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        Ok(shared.start_time)
    }

    /// Shut down the owned stream, drop the clock registration and notify
    /// the consumer callback exactly once. Idempotent.
    pub async fn shutdown(&self) {
        let (stream, clock, notify) = {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                (None, None, false)
            } else {
                shared.shutdown = true;
                let notify = !shared.notified;
                shared.notified = true;
                (shared.stream.take(), shared.clock.take(), notify)
            }
        };
        if let Some(stream) = stream {
            stream.shutdown();
        }
        if let Some(clock) = clock {
            clock.clear_observer();
        }
        if notify {
            // Outside the lock: the callback may block or call back in.
            self.inner.callback.on_shutdown().await;
            info!("media sink: shut down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shared.lock().unwrap().shutdown
    }

    fn reject(&self, op: &str, err: SinkError) -> SinkError {
        error!("media sink: {op} rejected: {err}");
        err
    }
}

impl ClockObserver for MediaSinkInner {
    fn on_clock_start(&self, position: StartPosition) -> SinkResult<()> {
        let stream = {
            let mut shared = self.shared.lock().unwrap();
            if shared.shutdown {
                return Err(SinkError::Shutdown);
            }
            if let StartPosition::Offset(t) = position {
                shared.start_time = t;
            }
            shared.stream.clone().ok_or(SinkError::StreamNotFound)?
        };
        stream.start(position)
    }

    fn on_clock_stop(&self) -> SinkResult<()> {
        let stream = {
            let shared = self.shared.lock().unwrap();
            if shared.shutdown {
                return Err(SinkError::Shutdown);
            }
            shared.stream.clone().ok_or(SinkError::StreamNotFound)?
        };
        stream.stop()
    }

    // Pause and restart are exposed on the stream sink API only, never
    // driven through the clock.
    fn on_clock_pause(&self) -> SinkResult<()> {
        Err(SinkError::UnsupportedTransition)
    }

    fn on_clock_restart(&self) -> SinkResult<()> {
        Err(SinkError::UnsupportedTransition)
    }

    fn on_clock_set_rate(&self, _rate: f32) -> SinkResult<()> {
        Ok(())
    }
}

impl Drop for MediaSinkInner {
    fn drop(&mut self) {
        // Destruction-path shutdown: run the synchronous half and hand the
        // async notification to the runtime when one is still around.
        let shared = self.shared.get_mut().unwrap();
        if shared.shutdown {
            return;
        }
        shared.shutdown = true;
        if let Some(stream) = shared.stream.take() {
            stream.shutdown();
        }
        if let Some(clock) = shared.clock.take() {
            clock.clear_observer();
        }
        if !shared.notified {
            shared.notified = true;
            let callback = Arc::clone(&self.callback);
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(async move { callback.on_shutdown().await });
            }
        }
    }
}
