//! Bounded handoff queue between the decode side and the presentation loop.
//!
//! Producers run on the engine's streaming threads and must never stall, so a
//! push into a full queue evicts the oldest frame instead of waiting. The
//! consumer polls with [`HandoffQueue::try_pop`] from the presentation loop and
//! never blocks either.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::FrameBuffer;

/// Default number of frames held between decode and presentation.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Result of a [`HandoffQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame admitted without eviction
    Queued,
    /// Frame admitted after releasing the oldest queued frame
    QueuedDroppedOldest,
    /// Queue is closed; the frame was released immediately
    Rejected,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandoffStats {
    pub pushed: u64,
    pub popped: u64,
    /// Frames evicted by drop-oldest
    pub dropped: u64,
    /// Frames released by [`HandoffQueue::close`]
    pub released_on_close: u64,
}

struct QueueInner {
    frames: VecDeque<FrameBuffer>,
    closed: bool,
}

/// A thread-safe, multi-producer, single-consumer bounded queue of frames.
pub struct HandoffQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    pushed: AtomicU64,
    popped: AtomicU64,
    dropped: AtomicU64,
    released_on_close: AtomicU64,
}

impl HandoffQueue {
    /// Creates a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            released_on_close: AtomicU64::new(0),
        }
    }

    /// Creates a queue with [`DEFAULT_QUEUE_CAPACITY`].
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    /// Admits a frame, evicting the oldest one if the queue is full.
    ///
    /// Never blocks beyond the internal lock. Evicted or rejected frames are
    /// dropped outside the lock.
    pub fn push(&self, frame: FrameBuffer) -> PushOutcome {
        let evicted;
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                drop(inner);
                tracing::trace!("HandoffQueue::push: closed, releasing frame {}", frame.sequence);
                return PushOutcome::Rejected;
            }
            evicted = if inner.frames.len() >= self.capacity {
                inner.frames.pop_front()
            } else {
                None
            };
            inner.frames.push_back(frame);
        }
        self.pushed.fetch_add(1, Ordering::Relaxed);

        match evicted {
            Some(old) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("HandoffQueue::push: full, dropped oldest frame {}", old.sequence);
                PushOutcome::QueuedDroppedOldest
            }
            None => PushOutcome::Queued,
        }
    }

    /// Takes the oldest frame, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<FrameBuffer> {
        let frame = self.inner.lock().frames.pop_front();
        if frame.is_some() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Returns true if no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of frames held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Releases every queued frame and rejects later pushes.
    ///
    /// Returns the number of frames released. Safe to call repeatedly.
    pub fn close(&self) -> usize {
        let drained: Vec<FrameBuffer> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.frames.drain(..).collect()
        };
        let count = drained.len();
        self.released_on_close
            .fetch_add(count as u64, Ordering::Relaxed);
        if count > 0 {
            tracing::debug!("HandoffQueue::close: released {} frames", count);
        }
        count
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Snapshot of the queue counters.
    pub fn stats(&self) -> HandoffStats {
        HandoffStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            released_on_close: self.released_on_close.load(Ordering::Relaxed),
        }
    }

    /// Push-only handle for engine sink callbacks.
    pub(crate) fn producer(self: &Arc<Self>) -> FrameProducer {
        FrameProducer {
            queue: Arc::clone(self),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Drop for HandoffQueue {
    fn drop(&mut self) {
        self.close();
    }
}

/// Producer side of a [`HandoffQueue`].
///
/// Only composited sessions hand one of these to their engine, so the
/// hole-punch path has no way to reach the queue. Clones share the queue and
/// the sequence counter.
#[derive(Clone)]
pub struct FrameProducer {
    queue: Arc<HandoffQueue>,
    sequence: Arc<AtomicU64>,
}

impl FrameProducer {
    /// Stamps the frame with the next sequence number and pushes it.
    pub fn push(&self, frame: FrameBuffer) -> PushOutcome {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.queue.push(frame.with_sequence(seq))
    }

    /// Returns true if the consumer side has shut the queue.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl std::fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProducer")
            .field("queue_len", &self.queue.len())
            .field("next_sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}
