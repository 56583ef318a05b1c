//! Serialized asynchronous work queue.

use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{SinkError, SinkResult};

/// Serialized work queue: operations submitted in order X, Y execute in
/// order X, Y, one body at a time, on a dedicated task. This is the only
/// ordering guarantee the sink gives and it decouples callers (capture and
/// clock threads) from the consumer delivery callback.
///
/// Cancellation is cooperative: `close` stops the worker after the
/// in-flight body completes.
pub struct SerialDispatcher<O> {
    tx: mpsc::UnboundedSender<O>,
    cancel: CancellationToken,
}

impl<O: Send + 'static> SerialDispatcher<O> {
    /// Spawn the worker task. Must be called from within a Tokio runtime.
    ///
    /// The handler runs to completion for each operation before the next
    /// one is received; two bodies never overlap.
    pub fn spawn<H, Fut>(mut handler: H) -> Self
    where
        H: FnMut(O) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    op = rx.recv() => match op {
                        Some(op) => handler(op).await,
                        None => break,
                    },
                }
            }
        });

        Self { tx, cancel }
    }

    /// Queue an operation for execution.
    pub fn submit(&self, op: O) -> SinkResult<()> {
        if self.cancel.is_cancelled() {
            return Err(SinkError::Shutdown);
        }
        self.tx
            .send(op)
            .map_err(|_| SinkError::Resource("dispatch queue closed".into()))
    }

    /// Stop the worker. The in-flight body, if any, finishes first.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<O> Drop for SerialDispatcher<O> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
