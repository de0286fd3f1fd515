//! Bounded, drop-policy mailboxes: the single shape every cross-thread
//! edge in this runtime uses. Enqueue from any thread; drain only from
//! the tick thread, which the mailbox asserts in debug builds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use warden_core::error::MailboxError;

/// An item a [`BoundedMailbox`] can hold: anything that can report its
/// own accounted size.
pub trait MailboxItem {
    /// Estimated footprint in bytes, used for the mailbox's byte cap.
    fn estimated_bytes(&self) -> usize;
}

/// Point-in-time metrics for a mailbox, safe to read from any thread
/// without synchronizing with enqueue/drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MailboxMetrics {
    /// Total items ever accepted.
    pub enqueued: u64,
    /// Total items ever drained and applied.
    pub applied: u64,
    /// Total items ever dropped (capacity eviction or oversized reject).
    pub dropped: u64,
    /// Items currently queued.
    pub current_count: usize,
    /// Bytes currently queued.
    pub current_bytes: usize,
    /// Highest `current_count` ever observed.
    pub peak_count: usize,
    /// Highest `current_bytes` ever observed.
    pub peak_bytes: usize,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicI64,
    applied: AtomicI64,
    dropped: AtomicI64,
    current_bytes: AtomicUsize,
    peak_count: AtomicUsize,
    peak_bytes: AtomicUsize,
}

impl Counters {
    fn record_enqueue(&self, new_count: usize, new_bytes: usize) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.current_bytes.store(new_bytes, Ordering::Relaxed);
        self.peak_count.fetch_max(new_count, Ordering::Relaxed);
        self.peak_bytes.fetch_max(new_bytes, Ordering::Relaxed);
    }

    fn record_drop(&self, new_bytes: usize) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.current_bytes.store(new_bytes, Ordering::Relaxed);
    }

    fn record_apply(&self, new_bytes: usize) {
        self.applied.fetch_add(1, Ordering::Relaxed);
        self.current_bytes.store(new_bytes, Ordering::Relaxed);
    }
}

/// A bounded FIFO with a drop-oldest overflow policy: enqueue is
/// callable from any thread; `drain` is tick-thread-exclusive. Callers
/// assert thread identity themselves (see
/// [`crate::thread_guard::assert_tick_thread`]) since this mailbox has
/// no dependency on the guard module.
pub struct BoundedMailbox<T> {
    queue: Mutex<VecDeque<T>>,
    max_count: usize,
    max_bytes: usize,
    counters: Counters,
}

impl<T: MailboxItem> BoundedMailbox<T> {
    /// Create a mailbox bounded by both item count and total bytes.
    pub fn new(max_count: usize, max_bytes: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            max_count,
            max_bytes,
            counters: Counters::default(),
        }
    }

    /// Attempt to enqueue an item. Rejects immediately (counted as a
    /// drop) if the item alone exceeds `max_bytes`; otherwise evicts
    /// the oldest items while over either cap, then enqueues.
    pub fn try_enqueue(&self, item: T) -> Result<(), MailboxError> {
        let item_bytes = item.estimated_bytes();
        if item_bytes > self.max_bytes {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(MailboxError::Oversized {
                item_bytes,
                max_bytes: self.max_bytes,
            });
        }

        let mut guard = self.queue.lock().expect("mailbox mutex poisoned");
        let mut current_bytes = self.counters.current_bytes.load(Ordering::Relaxed);
        while guard.len() >= self.max_count || current_bytes + item_bytes > self.max_bytes {
            match guard.pop_front() {
                Some(evicted) => {
                    current_bytes = current_bytes.saturating_sub(evicted.estimated_bytes());
                    self.counters.record_drop(current_bytes);
                }
                None => break,
            }
        }
        guard.push_back(item);
        current_bytes += item_bytes;
        self.counters.record_enqueue(guard.len(), current_bytes);
        Ok(())
    }

    /// Drain every queued item FIFO, invoking `applier` for each.
    /// Tick-thread-exclusive; callers assert thread identity before
    /// calling this.
    pub fn drain(&self, mut applier: impl FnMut(T)) {
        let mut guard = self.queue.lock().expect("mailbox mutex poisoned");
        let mut current_bytes = self.counters.current_bytes.load(Ordering::Relaxed);
        while let Some(item) = guard.pop_front() {
            current_bytes = current_bytes.saturating_sub(item.estimated_bytes());
            self.counters.record_apply(current_bytes);
            applier(item);
        }
    }

    /// Drop every queued item without applying it, releasing any
    /// owned resources via `T`'s own `Drop`.
    pub fn clear(&self) {
        let mut guard = self.queue.lock().expect("mailbox mutex poisoned");
        let dropped = guard.len() as i64;
        guard.clear();
        self.counters.dropped.fetch_add(dropped, Ordering::Relaxed);
        self.counters.current_bytes.store(0, Ordering::Relaxed);
    }

    /// A lock-free snapshot of this mailbox's metrics.
    pub fn metrics(&self) -> MailboxMetrics {
        let guard = self.queue.lock().expect("mailbox mutex poisoned");
        MailboxMetrics {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed) as u64,
            applied: self.counters.applied.load(Ordering::Relaxed) as u64,
            dropped: self.counters.dropped.load(Ordering::Relaxed) as u64,
            current_count: guard.len(),
            current_bytes: self.counters.current_bytes.load(Ordering::Relaxed),
            peak_count: self.counters.peak_count.load(Ordering::Relaxed),
            peak_bytes: self.counters.peak_bytes.load(Ordering::Relaxed),
        }
    }
}
