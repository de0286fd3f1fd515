//! Outbound send pump (C6): a dedicated background thread draining
//! per-session snapshot queues to the transport, off the tick thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use warden_core::id::SessionId;
use warden_core::pool::PooledLease;

use crate::session_index::ActiveSessionIndex;

/// A single serialized snapshot queued for one session.
pub struct OutboundSnapshot {
    /// Session this snapshot is addressed to.
    pub session_id: SessionId,
    /// Serialized payload, leased from a byte pool.
    pub payload: PooledLease,
}

/// Delivers an outbound snapshot to the transport. Implementations run
/// on the outbound pump's background thread, never the tick thread.
pub trait TransportSender: Send + Sync {
    /// Attempt delivery. `Ok` transfers ownership of the payload to the
    /// transport; `Err` returns it so the pump can count a drop.
    fn send(&self, session_id: SessionId, payload: PooledLease) -> Result<(), PooledLease>;
}

/// Point-in-time counters for the outbound pump.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutboundMetrics {
    /// Snapshots successfully handed to the transport.
    pub sent: u64,
    /// Snapshots the transport rejected.
    pub send_failed: u64,
    /// Snapshots dropped for having no queue (stale/unknown session).
    pub dropped_unqueued: u64,
}

struct Counters {
    sent: AtomicU64,
    send_failed: AtomicU64,
    dropped_unqueued: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            sent: AtomicU64::new(0),
            send_failed: AtomicU64::new(0),
            dropped_unqueued: AtomicU64::new(0),
        }
    }
}

/// Per-session FIFO queues of pending outbound snapshots.
#[derive(Default)]
pub struct OutboundQueues {
    queues: Mutex<HashMap<SessionId, std::collections::VecDeque<PooledLease>>>,
}

impl OutboundQueues {
    /// Create an empty set of queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a snapshot for `session_id`.
    pub fn enqueue(&self, session_id: SessionId, payload: PooledLease) {
        self.queues
            .lock()
            .expect("outbound queues mutex poisoned")
            .entry(session_id)
            .or_default()
            .push_back(payload);
    }

    /// Drop a session's queue entirely, e.g. on disconnect.
    pub fn remove_session(&self, session_id: SessionId) {
        self.queues
            .lock()
            .expect("outbound queues mutex poisoned")
            .remove(&session_id);
    }

    fn dequeue_up_to(&self, session_id: SessionId, max: usize) -> Vec<PooledLease> {
        let mut queues = self.queues.lock().expect("outbound queues mutex poisoned");
        let Some(queue) = queues.get_mut(&session_id) else {
            return Vec::new();
        };
        let mut taken = Vec::new();
        while taken.len() < max {
            match queue.pop_front() {
                Some(item) => taken.push(item),
                None => break,
            }
        }
        taken
    }
}

/// Drains per-session outbound queues on a dedicated background
/// thread: one iteration snapshots the active session list, then
/// dequeues at most `max_per_session` items per session, capped
/// globally by `max_per_iteration`.
pub struct OutboundPump {
    queues: std::sync::Arc<OutboundQueues>,
    sessions: std::sync::Arc<ActiveSessionIndex>,
    sender: std::sync::Arc<dyn TransportSender>,
    max_per_session: usize,
    max_per_iteration: usize,
    idle_delay: Duration,
    counters: Counters,
}

impl OutboundPump {
    /// Build a pump over shared queues, the active session index, and
    /// a transport sender.
    pub fn new(
        queues: std::sync::Arc<OutboundQueues>,
        sessions: std::sync::Arc<ActiveSessionIndex>,
        sender: std::sync::Arc<dyn TransportSender>,
        max_per_session: usize,
        max_per_iteration: usize,
        idle_delay: Duration,
    ) -> Self {
        Self {
            queues,
            sessions,
            sender,
            max_per_session,
            max_per_iteration,
            idle_delay,
            counters: Counters::default(),
        }
    }

    /// Run one drain iteration: snapshot the active session list
    /// ascending, then dequeue and send up to the configured caps.
    /// Returns the number of snapshots sent this iteration.
    pub fn run_iteration(&self) -> usize {
        let mut sent_this_iteration = 0usize;
        for session_id in self.sessions.snapshot() {
            if sent_this_iteration >= self.max_per_iteration {
                break;
            }
            let remaining_global = self.max_per_iteration - sent_this_iteration;
            let take = self.max_per_session.min(remaining_global);
            for payload in self.queues.dequeue_up_to(session_id, take) {
                match self.sender.send(session_id, payload) {
                    Ok(()) => {
                        self.counters.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_dropped) => {
                        self.counters.send_failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                sent_this_iteration += 1;
            }
        }
        sent_this_iteration
    }

    /// Run iterations until `stop` is set, sleeping `idle_delay`
    /// between them via the injected `sleep` closure (production
    /// callers pass `std::thread::sleep`; tests can pass a no-op).
    pub fn run(&self, stop: &AtomicBool, mut sleep: impl FnMut(Duration)) {
        while !stop.load(Ordering::Relaxed) {
            self.run_iteration();
            sleep(self.idle_delay);
        }
    }

    /// A snapshot of this pump's counters.
    pub fn metrics(&self) -> OutboundMetrics {
        OutboundMetrics {
            sent: self.counters.sent.load(Ordering::Relaxed),
            send_failed: self.counters.send_failed.load(Ordering::Relaxed),
            dropped_unqueued: self.counters.dropped_unqueued.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::pool::BytePool;

    struct RecordingSender {
        delivered: Mutex<Vec<SessionId>>,
        fail_next: AtomicBool,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail_next: AtomicBool::new(false),
            }
        }
    }

    impl TransportSender for RecordingSender {
        fn send(&self, session_id: SessionId, payload: PooledLease) -> Result<(), PooledLease> {
            if self.fail_next.swap(false, Ordering::Relaxed) {
                return Err(payload);
            }
            self.delivered.lock().unwrap().push(session_id);
            Ok(())
        }
    }

    #[test]
    fn drains_sessions_in_ascending_order_up_to_caps() {
        let pool = BytePool::new();
        let queues = std::sync::Arc::new(OutboundQueues::new());
        let sessions = std::sync::Arc::new(ActiveSessionIndex::new());
        sessions.insert(SessionId(2));
        sessions.insert(SessionId(1));
        queues.enqueue(SessionId(1), pool.rent(b"a"));
        queues.enqueue(SessionId(2), pool.rent(b"b"));
        queues.enqueue(SessionId(2), pool.rent(b"c"));

        let sender = std::sync::Arc::new(RecordingSender::new());
        let pump = OutboundPump::new(
            queues,
            sessions,
            sender.clone(),
            10,
            10,
            Duration::from_millis(0),
        );
        let sent = pump.run_iteration();
        assert_eq!(sent, 3);
        assert_eq!(
            *sender.delivered.lock().unwrap(),
            vec![SessionId(1), SessionId(2), SessionId(2)]
        );
        assert_eq!(pump.metrics().sent, 3);
    }

    #[test]
    fn global_cap_limits_total_sent_per_iteration() {
        let pool = BytePool::new();
        let queues = std::sync::Arc::new(OutboundQueues::new());
        let sessions = std::sync::Arc::new(ActiveSessionIndex::new());
        sessions.insert(SessionId(1));
        for _ in 0..5 {
            queues.enqueue(SessionId(1), pool.rent(b"x"));
        }
        let sender = std::sync::Arc::new(RecordingSender::new());
        let pump = OutboundPump::new(
            queues,
            sessions,
            sender,
            10,
            2,
            Duration::from_millis(0),
        );
        assert_eq!(pump.run_iteration(), 2);
    }

    #[test]
    fn send_failure_is_counted_not_fatal() {
        let pool = BytePool::new();
        let queues = std::sync::Arc::new(OutboundQueues::new());
        let sessions = std::sync::Arc::new(ActiveSessionIndex::new());
        sessions.insert(SessionId(1));
        queues.enqueue(SessionId(1), pool.rent(b"x"));
        let sender = std::sync::Arc::new(RecordingSender::new());
        sender.fail_next.store(true, Ordering::Relaxed);
        let pump = OutboundPump::new(
            queues,
            sessions,
            sender,
            10,
            10,
            Duration::from_millis(0),
        );
        pump.run_iteration();
        assert_eq!(pump.metrics().send_failed, 1);
        assert_eq!(pump.metrics().sent, 0);
    }
}
