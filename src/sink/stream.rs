//! Per-stream sink endpoint: state machine, sample queue and async
//! dispatch.
//!
//! All public operations take the sink's single mutex only around the
//! state check and mutation; the dispatch bodies run outside that lock
//! while invoking the consumer callback and re-acquire it for every
//! shared-state access.

use anyhow::Context;
use log::{debug, error, info};
use std::sync::{Arc, Mutex, Weak};

use crate::error::{SinkError, SinkResult};
use crate::frame::{MediaFrame, MediaKind, PixelFormat, Timestamp, VideoFormat};
use crate::sink::dispatcher::SerialDispatcher;
use crate::sink::events::{EventQueue, EventReceiver, StreamEvent};
use crate::sink::media::{MediaSink, MediaSinkInner, SinkCallback};
use crate::sink::queue::{QueueItem, SampleQueue};
use crate::sink::state::{StreamOperation, StreamState};

/// Where on the presentation timeline a stream starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Explicit presentation-time offset
    Offset(Timestamp),
    /// Derive the start time from the first delivered sample
    FromFirstSample,
}

/// Operation token handed to the serial dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchOp {
    Start,
    Restart,
    Stop,
    Pause,
    ProcessSample,
    FormatChange,
}

/// State guarded by the sink's single mutex. Lifecycle state and queue
/// live together so they are always observed atomically.
struct Shared {
    state: StreamState,
    queue: SampleQueue,
    current_type: Option<VideoFormat>,
    /// Once a subtype is accepted, every later media type must carry it.
    fixed_subtype: Option<PixelFormat>,
    start_time: Timestamp,
    start_from_sample: bool,
    shutdown: bool,
    callback: Option<Arc<dyn SinkCallback>>,
}

/// The per-stream endpoint of the media sink.
///
/// Cloning yields another handle to the same underlying sink.
#[derive(Clone)]
pub struct StreamSink {
    inner: Arc<StreamSinkInner>,
}

pub(crate) struct StreamSinkInner {
    id: u32,
    /// Non-owning back-reference for lifecycle forwarding.
    parent: Weak<MediaSinkInner>,
    shared: Mutex<Shared>,
    events: EventQueue,
    dispatcher: SerialDispatcher<DispatchOp>,
}

impl StreamSink {
    /// Build a stream sink and spawn its dispatcher. Must be called from
    /// within a Tokio runtime.
    pub(crate) fn new(
        id: u32,
        parent: Weak<MediaSinkInner>,
        callback: Arc<dyn SinkCallback>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StreamSinkInner>| {
            let weak = weak.clone();
            let dispatcher = SerialDispatcher::spawn(move |op| {
                let weak = weak.clone();
                async move {
                    if let Some(sink) = weak.upgrade() {
                        sink.dispatch(op).await;
                    }
                }
            });
            StreamSinkInner {
                id,
                parent,
                shared: Mutex::new(Shared {
                    state: StreamState::NotSet,
                    queue: SampleQueue::new(),
                    current_type: None,
                    fixed_subtype: None,
                    start_time: Timestamp::ZERO,
                    start_from_sample: false,
                    shutdown: false,
                    callback: Some(callback),
                }),
                events: EventQueue::new(),
                dispatcher,
            }
        });
        Self { inner }
    }

    /// The stream identifier assigned by the media sink.
    pub fn identifier(&self) -> SinkResult<u32> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(self.inner.reject("identifier", SinkError::Shutdown));
        }
        Ok(self.inner.id)
    }

    /// The owning media sink, while it is still alive.
    pub fn media_sink(&self) -> SinkResult<MediaSink> {
        self.inner
            .parent
            .upgrade()
            .map(MediaSink::from_inner)
            .ok_or(SinkError::Shutdown)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.inner.shared.lock().unwrap().state
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shared.lock().unwrap().shutdown
    }

    /// Check whether `format` could be accepted right now, without
    /// changing anything.
    pub fn is_media_type_supported(&self, format: &VideoFormat) -> SinkResult<()> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        check_type(&shared, format)
    }

    /// Negotiate the stream's media type.
    ///
    /// The first accepted type fixes the subtype and moves the sink to
    /// Ready. While streaming (or stopped) the swap is deferred: the new
    /// type is queued behind the samples already accepted and applies in
    /// dispatch order, so a format change never overtakes in-flight
    /// samples.
    pub fn set_media_type(&self, format: &VideoFormat) -> SinkResult<()> {
        let mut shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(self.inner.reject("set_media_type", SinkError::Shutdown));
        }
        shared
            .state
            .validate(StreamOperation::SetMediaType)
            .map_err(|e| self.inner.reject("set_media_type", e))?;
        check_type(&shared, format).map_err(|e| self.inner.reject("set_media_type", e))?;

        shared.fixed_subtype.get_or_insert(format.subtype);
        if shared.state <= StreamState::Ready {
            shared.current_type = Some(format.clone());
            if shared.state == StreamState::NotSet {
                shared.state = StreamState::Ready;
            }
        } else {
            shared.queue.push(QueueItem::FormatChange(format.clone()));
            // While paused nothing dispatches; the change applies during
            // the resume backlog drain.
            if shared.state != StreamState::Paused {
                self.inner.submit(DispatchOp::FormatChange)?;
            }
        }
        Ok(())
    }

    /// The negotiated media type, if any.
    pub fn current_media_type(&self) -> SinkResult<VideoFormat> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        shared.current_type.clone().ok_or(SinkError::NotInitialized)
    }

    /// Major type of this stream. Always Video once a type is set.
    pub fn major_type(&self) -> SinkResult<MediaKind> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.current_type.is_none() {
            return Err(SinkError::NotInitialized);
        }
        Ok(MediaKind::Video)
    }

    /// Accept a captured frame from an upstream component.
    ///
    /// The frame is queued and, unless the sink is paused, an async
    /// dispatch is scheduled to deliver it. Acceptance here does not mean
    /// delivery succeeded; delivery failures surface as
    /// [`StreamEvent::Error`].
    pub fn process_sample(&self, frame: MediaFrame) -> SinkResult<()> {
        let mut shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(self.inner.reject("process_sample", SinkError::Shutdown));
        }
        shared
            .state
            .validate(StreamOperation::ProcessSample)
            .map_err(|e| self.inner.reject("process_sample", e))?;

        shared.queue.push(QueueItem::Sample(frame));
        if shared.state != StreamState::Paused {
            self.inner.submit(DispatchOp::ProcessSample)?;
        }
        Ok(())
    }

    /// Called when the presentation clock starts (or the stream resumes).
    pub fn start(&self, position: StartPosition) -> SinkResult<()> {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.inner.reject("start", SinkError::Shutdown));
            }
            shared
                .state
                .validate(StreamOperation::Start)
                .map_err(|e| self.inner.reject("start", e))?;
            match position {
                StartPosition::Offset(t) => {
                    shared.start_time = t;
                    shared.start_from_sample = false;
                }
                StartPosition::FromFirstSample => shared.start_from_sample = true,
            }
            shared.state = StreamState::Started;
            self.inner.submit(DispatchOp::Start)?;
        }
        info!("stream sink {}: started", self.inner.id);
        Ok(())
    }

    /// Called when the presentation clock stops.
    pub fn stop(&self) -> SinkResult<()> {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.inner.reject("stop", SinkError::Shutdown));
            }
            shared
                .state
                .validate(StreamOperation::Stop)
                .map_err(|e| self.inner.reject("stop", e))?;
            shared.state = StreamState::Stopped;
            self.inner.submit(DispatchOp::Stop)?;
        }
        info!("stream sink {}: stopped", self.inner.id);
        Ok(())
    }

    /// Suspend delivery, keeping queued samples for resume.
    pub fn pause(&self) -> SinkResult<()> {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.inner.reject("pause", SinkError::Shutdown));
            }
            shared
                .state
                .validate(StreamOperation::Pause)
                .map_err(|e| self.inner.reject("pause", e))?;
            shared.state = StreamState::Paused;
            self.inner.submit(DispatchOp::Pause)?;
        }
        info!("stream sink {}: paused", self.inner.id);
        Ok(())
    }

    /// Resume from pause.
    pub fn restart(&self) -> SinkResult<()> {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.inner.reject("restart", SinkError::Shutdown));
            }
            shared
                .state
                .validate(StreamOperation::Restart)
                .map_err(|e| self.inner.reject("restart", e))?;
            shared.state = StreamState::Started;
            self.inner.submit(DispatchOp::Restart)?;
        }
        info!("stream sink {}: restarted", self.inner.id);
        Ok(())
    }

    /// The explicit start offset, or the one derived from the first
    /// sample when the stream was started in that mode.
    pub fn start_time(&self) -> SinkResult<Timestamp> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.shutdown {
            return Err(SinkError::Shutdown);
        }
        Ok(shared.start_time)
    }

    /// Synchronously discard every queued item visible right now.
    pub fn flush(&self) -> SinkResult<()> {
        let dropped = {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return Err(self.inner.reject("flush", SinkError::Shutdown));
            }
            shared.queue.take_all()
        };
        if !dropped.is_empty() {
            debug!(
                "stream sink {}: flushed {} queued items",
                self.inner.id,
                dropped.len()
            );
        }
        Ok(())
    }

    /// Take the host's end of the lifecycle-event channel. Available
    /// exactly once. `EventReceiver::recv` blocks and must not be called
    /// while holding any lock of this sink.
    pub fn events(&self) -> Option<EventReceiver> {
        self.inner.events.take_receiver()
    }

    /// Shut the sink down, releasing the queue, the event channel, the
    /// negotiated type and the callback reference. Idempotent; later
    /// calls are no-ops.
    pub fn shutdown(&self) {
        let dropped = {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.shutdown {
                return;
            }
            shared.shutdown = true;
            shared.current_type = None;
            shared.callback = None;
            shared.queue.take_all()
        };
        self.inner.events.shutdown();
        self.inner.dispatcher.close();
        drop(dropped);
        info!("stream sink {}: shut down", self.inner.id);
    }
}

/// Media-type compatibility: major type must be Video and, once a subtype
/// is fixed, every later type must carry the same subtype.
fn check_type(shared: &Shared, format: &VideoFormat) -> SinkResult<()> {
    if format.kind != MediaKind::Video {
        return Err(SinkError::InvalidType);
    }
    if let Some(fixed) = shared.fixed_subtype {
        if format.subtype != fixed {
            return Err(SinkError::InvalidType);
        }
    }
    Ok(())
}

impl StreamSinkInner {
    fn reject(&self, op: &str, err: SinkError) -> SinkError {
        error!("stream sink {}: {op} rejected: {err}", self.id);
        err
    }

    fn submit(&self, op: DispatchOp) -> SinkResult<()> {
        self.dispatcher.submit(op).map_err(|e| {
            error!("stream sink {}: failed to queue {op:?}: {e}", self.id);
            e
        })
    }

    /// Dispatch entry point, run serialized on the work queue.
    async fn dispatch(&self, op: DispatchOp) {
        if let Err(err) = self.dispatch_inner(op).await {
            self.handle_error(err);
        }
    }

    /// Centralized conversion of dispatch-side failures into an error
    /// lifecycle event. Never propagates out of the dispatcher.
    fn handle_error(&self, err: anyhow::Error) {
        if self.shared.lock().unwrap().shutdown {
            return;
        }
        error!("stream sink {}: dispatch failed: {err:#}", self.id);
        let _ = self.events.emit(StreamEvent::Error {
            reason: format!("{err:#}"),
        });
    }

    async fn dispatch_inner(&self, op: DispatchOp) -> anyhow::Result<()> {
        match op {
            DispatchOp::Start | DispatchOp::Restart => {
                self.events.emit(StreamEvent::Started)?;

                // Samples may have queued up while paused; deliver them in
                // their original order before asking for new input.
                let ended_empty = self.deliver_backlog().await?;
                let request = {
                    let shared = self.shared.lock().unwrap();
                    ended_empty && shared.state == StreamState::Started && !shared.shutdown
                };
                if request {
                    self.events.emit(StreamEvent::RequestSample)?;
                }
            }
            DispatchOp::Stop => {
                let dropped = { self.shared.lock().unwrap().queue.take_all() };
                if !dropped.is_empty() {
                    debug!(
                        "stream sink {}: dropped {} queued items on stop",
                        self.id,
                        dropped.len()
                    );
                }
                self.events.emit(StreamEvent::Stopped)?;
            }
            DispatchOp::Pause => self.events.emit(StreamEvent::Paused)?,
            DispatchOp::ProcessSample | DispatchOp::FormatChange => {
                self.dispatch_next_item().await?;
            }
        }
        Ok(())
    }

    /// Deliver everything visible in the queue at entry, in order.
    /// Interruptible only by shutdown. Returns whether the queue ended
    /// empty (items pushed mid-drain stay queued for the next dispatch).
    async fn deliver_backlog(&self) -> anyhow::Result<bool> {
        let snapshot = { self.shared.lock().unwrap().queue.take_all() };
        for item in snapshot {
            if !self.deliver_item(item).await? {
                return Ok(false);
            }
        }
        Ok(self.shared.lock().unwrap().queue.is_empty())
    }

    /// Deliver the single oldest queued item, then keep the pull protocol
    /// alive with one more request-sample while the sink stays started.
    async fn dispatch_next_item(&self) -> anyhow::Result<()> {
        let item = { self.shared.lock().unwrap().queue.pop_front() };
        let delivered = match item {
            Some(item) => self.deliver_item(item).await?,
            // Nothing queued for this dispatch; still ask for more input.
            None => true,
        };
        let request = {
            let shared = self.shared.lock().unwrap();
            delivered && shared.state == StreamState::Started && !shared.shutdown
        };
        if request {
            self.events.emit(StreamEvent::RequestSample)?;
        }
        Ok(())
    }

    /// Forward a sample to the consumer callback or apply a deferred
    /// format change. Returns false when shutdown interrupted delivery.
    async fn deliver_item(&self, item: QueueItem) -> anyhow::Result<bool> {
        match item {
            QueueItem::Sample(frame) => {
                let callback = {
                    let mut shared = self.shared.lock().unwrap();
                    if shared.shutdown {
                        return Ok(false);
                    }
                    if shared.start_from_sample {
                        shared.start_time = frame.pts;
                        shared.start_from_sample = false;
                    }
                    shared.callback.clone()
                };
                let Some(callback) = callback else {
                    return Ok(false);
                };
                // The callback runs outside the sink mutex.
                callback
                    .on_sample(frame)
                    .await
                    .context("sample delivery failed")?;
            }
            QueueItem::FormatChange(format) => {
                let mut shared = self.shared.lock().unwrap();
                if shared.shutdown {
                    return Ok(false);
                }
                debug!("stream sink {}: media type now {format}", self.id);
                shared.current_type = Some(format);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorder {
        samples: Mutex<Vec<MediaFrame>>,
        fail_next: AtomicBool,
        shutdowns: AtomicUsize,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                samples: Mutex::new(Vec::new()),
                fail_next: AtomicBool::new(false),
                shutdowns: AtomicUsize::new(0),
            })
        }

        fn tags(&self) -> Vec<u8> {
            self.samples.lock().unwrap().iter().map(|f| f.data[0]).collect()
        }
    }

    #[async_trait]
    impl SinkCallback for Recorder {
        async fn on_sample(&self, frame: MediaFrame) -> anyhow::Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                anyhow::bail!("consumer rejected the sample");
            }
            self.samples.lock().unwrap().push(frame);
            Ok(())
        }

        async fn on_shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn rgb24() -> VideoFormat {
        VideoFormat::video(PixelFormat::Rgb24, 640, 480, 30)
    }

    fn frame(tag: u8) -> MediaFrame {
        MediaFrame::video(
            Bytes::from(vec![tag]),
            Timestamp::from_micros(tag as i64 * 1_000),
            Timestamp::from_micros(tag as i64 * 1_000),
            false,
            640,
            480,
        )
    }

    fn sink_with(callback: Arc<Recorder>) -> StreamSink {
        StreamSink::new(0, Weak::new(), callback)
    }

    async fn expect_event(rx: &mut EventReceiver, want: StreamEvent) {
        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel ended");
        assert_eq!(got, want);
    }

    async fn wait_for_samples(recorder: &Recorder, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.samples.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timed out waiting for deliveries");
    }

    #[tokio::test]
    async fn test_end_to_end_lifecycle() {
        let recorder = Recorder::new();
        let sink = sink_with(Arc::clone(&recorder));
        let mut events = sink.events().expect("event channel");

        assert_eq!(sink.state(), StreamState::NotSet);
        assert_eq!(sink.current_media_type(), Err(SinkError::NotInitialized));

        sink.set_media_type(&rgb24()).unwrap();
        assert_eq!(sink.state(), StreamState::Ready);
        assert_eq!(sink.major_type().unwrap(), MediaKind::Video);

        sink.start(StartPosition::Offset(Timestamp::from_micros(100)))
            .unwrap();
        assert_eq!(sink.state(), StreamState::Started);
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;
        assert_eq!(sink.start_time().unwrap(), Timestamp::from_micros(100));

        sink.process_sample(frame(1)).unwrap();
        expect_event(&mut events, StreamEvent::RequestSample).await;
        assert_eq!(recorder.tags(), vec![1]);

        sink.stop().unwrap();
        expect_event(&mut events, StreamEvent::Stopped).await;
        assert_eq!(sink.state(), StreamState::Stopped);
    }

    #[tokio::test]
    async fn test_fifo_order_across_format_change() {
        let recorder = Recorder::new();
        let sink = sink_with(Arc::clone(&recorder));
        let mut events = sink.events().unwrap();

        sink.set_media_type(&rgb24()).unwrap();
        sink.start(StartPosition::Offset(Timestamp::ZERO)).unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;

        sink.process_sample(frame(1)).unwrap();
        sink.process_sample(frame(2)).unwrap();
        let larger = VideoFormat::video(PixelFormat::Rgb24, 1280, 720, 30);
        sink.set_media_type(&larger).unwrap();
        sink.process_sample(frame(3)).unwrap();

        wait_for_samples(&recorder, 3).await;
        assert_eq!(recorder.tags(), vec![1, 2, 3]);
        // The swap applied in dispatch order, after the samples before it.
        assert_eq!(sink.current_media_type().unwrap(), larger);
    }

    #[tokio::test]
    async fn test_pause_resumes_backlog_in_order() {
        let recorder = Recorder::new();
        let sink = sink_with(Arc::clone(&recorder));
        let mut events = sink.events().unwrap();

        sink.set_media_type(&rgb24()).unwrap();
        sink.start(StartPosition::FromFirstSample).unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;

        sink.pause().unwrap();
        expect_event(&mut events, StreamEvent::Paused).await;

        sink.process_sample(frame(1)).unwrap();
        sink.process_sample(frame(2)).unwrap();
        sink.process_sample(frame(3)).unwrap();

        // Nothing is delivered while paused.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.tags().is_empty());

        sink.start(StartPosition::FromFirstSample).unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        // The backlog drains in order before any new input is requested.
        expect_event(&mut events, StreamEvent::RequestSample).await;
        assert_eq!(recorder.tags(), vec![1, 2, 3]);
        // Start time was derived from the first delivered sample.
        assert_eq!(sink.start_time().unwrap(), Timestamp::from_micros(1_000));
    }

    #[tokio::test]
    async fn test_format_change_while_paused_applies_on_restart() {
        let recorder = Recorder::new();
        let sink = sink_with(Arc::clone(&recorder));
        let mut events = sink.events().unwrap();

        sink.set_media_type(&rgb24()).unwrap();
        sink.start(StartPosition::Offset(Timestamp::ZERO)).unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;

        sink.pause().unwrap();
        expect_event(&mut events, StreamEvent::Paused).await;

        let larger = VideoFormat::video(PixelFormat::Rgb24, 1920, 1080, 60);
        sink.set_media_type(&larger).unwrap();
        assert_eq!(sink.current_media_type().unwrap(), rgb24());

        sink.restart().unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;
        assert_eq!(sink.current_media_type().unwrap(), larger);
    }

    #[tokio::test]
    async fn test_flush_discards_queued_samples() {
        let recorder = Recorder::new();
        let sink = sink_with(Arc::clone(&recorder));
        let mut events = sink.events().unwrap();

        sink.set_media_type(&rgb24()).unwrap();
        sink.start(StartPosition::Offset(Timestamp::ZERO)).unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;

        sink.pause().unwrap();
        expect_event(&mut events, StreamEvent::Paused).await;
        sink.process_sample(frame(1)).unwrap();
        sink.process_sample(frame(2)).unwrap();
        sink.flush().unwrap();

        sink.start(StartPosition::Offset(Timestamp::ZERO)).unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;
        assert!(recorder.tags().is_empty());
    }

    #[tokio::test]
    async fn test_incompatible_subtype_rejected() {
        let recorder = Recorder::new();
        let sink = sink_with(recorder);

        let audio = VideoFormat {
            kind: MediaKind::Audio,
            subtype: PixelFormat::Unknown,
            width: 0,
            height: 0,
            frame_rate: 0,
        };
        assert_eq!(sink.set_media_type(&audio), Err(SinkError::InvalidType));

        sink.set_media_type(&rgb24()).unwrap();
        let nv12 = VideoFormat::video(PixelFormat::Nv12, 640, 480, 30);
        assert_eq!(sink.set_media_type(&nv12), Err(SinkError::InvalidType));
        assert_eq!(sink.is_media_type_supported(&nv12), Err(SinkError::InvalidType));

        // Same subtype with different geometry stays acceptable.
        let bigger = VideoFormat::video(PixelFormat::Rgb24, 1920, 1080, 60);
        sink.set_media_type(&bigger).unwrap();
    }

    #[tokio::test]
    async fn test_state_validation_errors() {
        let recorder = Recorder::new();
        let sink = sink_with(recorder);

        assert_eq!(
            sink.process_sample(frame(1)),
            Err(SinkError::NotInitialized)
        );
        assert_eq!(
            sink.start(StartPosition::FromFirstSample),
            Err(SinkError::NotInitialized)
        );

        sink.set_media_type(&rgb24()).unwrap();
        assert_eq!(sink.restart(), Err(SinkError::InvalidRequest));
        assert_eq!(sink.process_sample(frame(1)), Err(SinkError::InvalidRequest));

        sink.start(StartPosition::FromFirstSample).unwrap();
        assert_eq!(sink.restart(), Err(SinkError::InvalidRequest));

        sink.stop().unwrap();
        assert_eq!(sink.pause(), Err(SinkError::InvalidRequest));
        assert_eq!(sink.process_sample(frame(1)), Err(SinkError::InvalidRequest));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_terminal() {
        let recorder = Recorder::new();
        let sink = sink_with(recorder);
        sink.set_media_type(&rgb24()).unwrap();

        sink.shutdown();
        sink.shutdown(); // no-op

        assert!(sink.is_shutdown());
        assert_eq!(sink.identifier(), Err(SinkError::Shutdown));
        assert_eq!(sink.set_media_type(&rgb24()), Err(SinkError::Shutdown));
        assert_eq!(sink.process_sample(frame(1)), Err(SinkError::Shutdown));
        assert_eq!(
            sink.start(StartPosition::FromFirstSample),
            Err(SinkError::Shutdown)
        );
        assert_eq!(sink.stop(), Err(SinkError::Shutdown));
        assert_eq!(sink.flush(), Err(SinkError::Shutdown));
        assert_eq!(sink.current_media_type(), Err(SinkError::Shutdown));
    }

    #[tokio::test]
    async fn test_delivery_failure_becomes_error_event() {
        let recorder = Recorder::new();
        let sink = sink_with(Arc::clone(&recorder));
        let mut events = sink.events().unwrap();

        sink.set_media_type(&rgb24()).unwrap();
        sink.start(StartPosition::Offset(Timestamp::ZERO)).unwrap();
        expect_event(&mut events, StreamEvent::Started).await;
        expect_event(&mut events, StreamEvent::RequestSample).await;

        recorder.fail_next.store(true, Ordering::SeqCst);
        sink.process_sample(frame(1)).unwrap();
        match tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            StreamEvent::Error { reason } => assert!(reason.contains("rejected")),
            other => panic!("expected error event, got {other:?}"),
        }

        // The dispatcher survives the failure and keeps delivering.
        sink.process_sample(frame(2)).unwrap();
        expect_event(&mut events, StreamEvent::RequestSample).await;
        assert_eq!(recorder.tags(), vec![2]);
    }

    #[tokio::test]
    async fn test_concurrent_process_sample() {
        let recorder = Recorder::new();
        let sink = sink_with(Arc::clone(&recorder));

        sink.set_media_type(&rgb24()).unwrap();
        sink.start(StartPosition::Offset(Timestamp::ZERO)).unwrap();

        let a = sink.clone();
        let b = sink.clone();
        let task_a = tokio::spawn(async move {
            for tag in 0..50u8 {
                a.process_sample(frame(tag)).unwrap();
            }
        });
        let task_b = tokio::spawn(async move {
            for tag in 100..150u8 {
                b.process_sample(frame(tag)).unwrap();
            }
        });
        task_a.await.unwrap();
        task_b.await.unwrap();

        wait_for_samples(&recorder, 100).await;
        let tags = recorder.tags();
        assert_eq!(tags.len(), 100);

        // Every sample delivered exactly once, and each producer's
        // submission order is preserved in the interleaving.
        let from_a: Vec<u8> = tags.iter().copied().filter(|t| *t < 50).collect();
        let from_b: Vec<u8> = tags.iter().copied().filter(|t| *t >= 100).collect();
        assert_eq!(from_a, (0..50).collect::<Vec<_>>());
        assert_eq!(from_b, (100..150).collect::<Vec<_>>());
    }
}
