//! FIFO of pending samples and deferred format changes.

use std::collections::VecDeque;

use crate::frame::{MediaFrame, VideoFormat};

/// An entry awaiting dispatch. Insertion order is delivery order.
#[derive(Debug, Clone)]
pub enum QueueItem {
    /// A captured frame bound for the consumer callback
    Sample(MediaFrame),
    /// A deferred media-type swap, ordered against queued samples
    FormatChange(VideoFormat),
}

/// Insertion-ordered queue of pending items.
///
/// Not internally synchronized: the owning stream sink keeps it inside the
/// same mutex as the lifecycle state so state and queue are observed
/// atomically. Growth is unbounded; pacing comes from the request-sample
/// pull protocol, not from a cap.
#[derive(Debug, Default)]
pub struct SampleQueue {
    items: VecDeque<QueueItem>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append an item at the tail
    pub fn push(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    /// Remove and return the oldest item
    pub fn pop_front(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    /// Move out everything currently queued.
    ///
    /// A drain operates on this snapshot: items pushed after the snapshot
    /// is taken belong to the next drain and are never silently dropped.
    pub fn take_all(&mut self) -> VecDeque<QueueItem> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
