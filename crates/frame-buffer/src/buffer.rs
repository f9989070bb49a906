//! Drop-Oldest Frame Buffer Implementation

use crate::{RecvError, TryRecvError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Default retention depth (two frames)
pub const DEFAULT_DEPTH: usize = 2;

struct Slots<T> {
    /// Oldest at the front, newest at the back
    items: VecDeque<T>,
    /// Set once the producer reports that no more items will arrive
    closed: bool,
}

/// Bounded SPSC frame buffer with drop-oldest overflow
pub struct FrameBuffer<T> {
    slots: Mutex<Slots<T>>,
    /// Signalled on every push and on close
    ready: Condvar,
    /// Maximum retained items
    depth: usize,
    /// Total items pushed (for statistics)
    total_pushed: AtomicU64,
    /// Items evicted before anyone popped them
    total_dropped: AtomicU64,
}

impl<T> FrameBuffer<T> {
    /// Create a buffer retaining at most `depth` items
    ///
    /// A depth of zero is bumped to one; a buffer that can hold nothing
    /// would drop every frame.
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            slots: Mutex::new(Slots {
                items: VecDeque::with_capacity(depth),
                closed: false,
            }),
            ready: Condvar::new(),
            depth,
            total_pushed: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Create a buffer with the default depth of two
    pub fn with_default_depth() -> Self {
        Self::new(DEFAULT_DEPTH)
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push an item, evicting the oldest retained one if full
    ///
    /// Never blocks on the consumer and never fails. Items pushed after
    /// [`close`](Self::close) are still retained but will not be delivered
    /// by `recv`.
    pub fn push(&self, item: T) {
        let mut slots = self.lock();
        if slots.items.len() >= self.depth {
            slots.items.pop_front();
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("frame buffer full, dropped oldest");
        }
        slots.items.push_back(item);
        self.total_pushed.fetch_add(1, Ordering::Relaxed);
        drop(slots);
        self.ready.notify_one();
    }

    /// Remove the oldest retained item, if any
    ///
    /// Ignores the closed flag; use [`try_recv`](Self::try_recv) when the
    /// producer's failure must take precedence.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Non-blocking receive that reports closure before buffered items
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut slots = self.lock();
        if slots.closed {
            return Err(TryRecvError::Closed);
        }
        slots.items.pop_front().ok_or(TryRecvError::Empty)
    }

    /// Block until an item is available or the buffer is closed
    ///
    /// Closure wins over buffered items: once the producer has failed, the
    /// consumer is told so instead of being handed leftover frames.
    pub fn recv(&self) -> Result<T, RecvError> {
        let mut slots = self.lock();
        loop {
            if slots.closed {
                return Err(RecvError::Closed);
            }
            if let Some(item) = slots.items.pop_front() {
                return Ok(item);
            }
            slots = self
                .ready
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.lock();
        loop {
            if slots.closed {
                return Err(RecvError::Closed);
            }
            if let Some(item) = slots.items.pop_front() {
                return Ok(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RecvError::Timeout);
            }
            slots = self
                .ready
                .wait_timeout(slots, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Mark the producer as gone and wake any waiting consumer
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Check whether the producer closed the buffer
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of items currently retained
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum retained items
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Total items pushed since creation
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed.load(Ordering::Relaxed)
    }

    /// Total items evicted without being popped
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }
}

impl<T> Default for FrameBuffer<T> {
    fn default() -> Self {
        Self::with_default_depth()
    }
}

impl<T> std::fmt::Debug for FrameBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("depth", &self.depth)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("total_pushed", &self.total_pushed())
            .field("total_dropped", &self.total_dropped())
            .finish()
    }
}
