//! Inbound pump & command ingestor (C5): per-session admission queues
//! bounded independently, drained once per tick into frozen per-session
//! command batches.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use warden_core::error::InvariantViolation;
use warden_core::frame::{FrozenCommandBatch, InboundFrame, SessionCommand};
use warden_core::id::{EntityHandle, SessionId, TickId};
use warden_core::traits::{PhaseHook, TickContext};

#[derive(Default)]
struct SessionQueue {
    frames: VecDeque<InboundFrame>,
    bytes: usize,
}

/// Point-in-time counters for an [`InboundMailbox`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InboundMailboxMetrics {
    /// Total frames ever accepted across every session.
    pub enqueued: u64,
    /// Total frames ever dropped (per-session capacity eviction).
    pub dropped: u64,
}

/// The transport-facing mailbox: a per-session sub-queue under one
/// lock, each bounded independently by frame count and bytes so a
/// single noisy session cannot starve another session's admission.
/// Enqueue is callable from any transport thread; drain only from the
/// tick thread via the inbound pump.
pub struct InboundMailbox {
    queues: Mutex<HashMap<SessionId, SessionQueue>>,
    max_frames_per_session: usize,
    max_bytes_per_session: usize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl InboundMailbox {
    /// Create a mailbox whose per-session sub-queues are each bounded
    /// by `max_frames_per_session` frames and `max_bytes_per_session`
    /// bytes.
    pub fn new(max_frames_per_session: usize, max_bytes_per_session: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_frames_per_session,
            max_bytes_per_session,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame into its session's sub-queue, evicting that same
    /// session's oldest frames while over either cap. A session flooding
    /// frames only ever evicts its own backlog.
    pub fn try_enqueue(&self, frame: InboundFrame) {
        let frame_bytes = frame.estimated_bytes();
        let mut queues = self.queues.lock().expect("inbound mailbox mutex poisoned");
        let queue = queues.entry(frame.session_id).or_default();
        while !queue.frames.is_empty()
            && (queue.frames.len() >= self.max_frames_per_session
                || queue.bytes + frame_bytes > self.max_bytes_per_session)
        {
            if let Some(evicted) = queue.frames.pop_front() {
                queue.bytes = queue.bytes.saturating_sub(evicted.estimated_bytes());
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        queue.bytes += frame_bytes;
        queue.frames.push_back(frame);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain frames across every session, visiting sessions in
    /// ascending session id order, up to `max_total` frames overall.
    pub fn drain(&self, max_total: usize, mut applier: impl FnMut(InboundFrame)) {
        let mut queues = self.queues.lock().expect("inbound mailbox mutex poisoned");
        let mut session_ids: Vec<SessionId> = queues.keys().copied().collect();
        session_ids.sort();
        let mut taken = 0usize;
        for session_id in session_ids {
            if taken >= max_total {
                break;
            }
            if let Some(queue) = queues.get_mut(&session_id) {
                while taken < max_total {
                    match queue.frames.pop_front() {
                        Some(frame) => {
                            queue.bytes = queue.bytes.saturating_sub(frame.estimated_bytes());
                            applier(frame);
                            taken += 1;
                        }
                        None => break,
                    }
                }
            }
        }
        queues.retain(|_, q| !q.frames.is_empty());
    }

    /// Drop a session's sub-queue entirely, e.g. on disconnect.
    pub fn remove_session(&self, session_id: SessionId) {
        self.queues
            .lock()
            .expect("inbound mailbox mutex poisoned")
            .remove(&session_id);
    }

    /// Drop every queued frame across every session.
    pub fn clear(&self) {
        self.queues.lock().expect("inbound mailbox mutex poisoned").clear();
    }

    /// Point-in-time counters.
    pub fn metrics(&self) -> InboundMailboxMetrics {
        InboundMailboxMetrics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Assembles per-session [`FrozenCommandBatch`]es from drained inbound
/// frames, tagged with the tick they were frozen during.
pub struct CommandIngestor {
    sessions: Mutex<HashMap<SessionId, FrozenCommandBatch>>,
}

impl Default for CommandIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandIngestor {
    /// Create an ingestor with no frozen batches yet.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the frozen batch set with one built from `frames`,
    /// tagged with `tick`. Frames are grouped by session id; within a
    /// session, command order follows drain (arrival) order.
    pub fn freeze(&self, tick: TickId, frames: Vec<InboundFrame>) {
        let mut grouped: HashMap<SessionId, Vec<SessionCommand>> = HashMap::new();
        for frame in frames {
            grouped
                .entry(frame.session_id)
                .or_default()
                .push(SessionCommand {
                    payload: frame.payload,
                    command_type: frame.command_type,
                });
        }
        let mut sessions = self.sessions.lock().expect("ingestor mutex poisoned");
        sessions.clear();
        for (session_id, commands) in grouped {
            sessions.insert(session_id, FrozenCommandBatch::new(tick, session_id, commands));
        }
    }

    /// Sessions with a frozen batch this tick, in ascending session id
    /// order — the iteration order the inbound pump and any consuming
    /// participant must use.
    pub fn session_ids_ascending(&self) -> Vec<SessionId> {
        let sessions = self.sessions.lock().expect("ingestor mutex poisoned");
        let mut ids: Vec<SessionId> = sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of commands frozen for `session_id` this tick, or 0 if
    /// the session has no frozen batch.
    pub fn command_count_for(&self, session_id: SessionId, current_tick: TickId) -> usize {
        let sessions = self.sessions.lock().expect("ingestor mutex poisoned");
        sessions
            .get(&session_id)
            .and_then(|batch| batch.commands_for(current_tick).ok())
            .map(|commands| commands.len())
            .unwrap_or(0)
    }

    /// Clear every frozen batch, releasing their payload leases.
    pub fn clear(&self) {
        self.sessions.lock().expect("ingestor mutex poisoned").clear();
    }
}

/// Pre-tick hook that drains the inbound mailbox up to
/// `max_frames_per_tick` and freezes the resulting per-session
/// batches, tagged with the current tick.
pub struct InboundPump {
    mailbox: std::sync::Arc<InboundMailbox>,
    ingestor: std::sync::Arc<CommandIngestor>,
    max_frames_per_tick: usize,
}

impl InboundPump {
    /// Build a pump over a shared mailbox and ingestor.
    pub fn new(
        mailbox: std::sync::Arc<InboundMailbox>,
        ingestor: std::sync::Arc<CommandIngestor>,
        max_frames_per_tick: usize,
    ) -> Self {
        Self {
            mailbox,
            ingestor,
            max_frames_per_tick,
        }
    }
}

impl PhaseHook for InboundPump {
    fn name(&self) -> &str {
        "inbound-pump"
    }

    fn on_pre_tick(&mut self, ctx: &mut dyn TickContext, _eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
        let mut drained = Vec::new();
        self.mailbox.drain(self.max_frames_per_tick, |frame| drained.push(frame));
        self.ingestor.freeze(ctx.tick_index(), drained);
        Ok(())
    }

    fn on_post_tick(&mut self, _ctx: &mut dyn TickContext, _eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::pool::BytePool;

    fn frame(pool: &BytePool, session: u128, tick: i64) -> InboundFrame {
        InboundFrame {
            session_id: SessionId(session),
            payload: pool.rent(b"x"),
            command_type: 1,
            submit_tick: TickId(tick),
        }
    }

    #[test]
    fn freeze_groups_by_session_and_tags_tick() {
        let pool = BytePool::new();
        let ingestor = CommandIngestor::new();
        ingestor.freeze(
            TickId(5),
            vec![
                frame(&pool, 2, 5),
                frame(&pool, 1, 5),
                frame(&pool, 2, 5),
            ],
        );
        assert_eq!(
            ingestor.session_ids_ascending(),
            vec![SessionId(1), SessionId(2)]
        );
        assert_eq!(ingestor.command_count_for(SessionId(2), TickId(5)), 2);
        assert_eq!(ingestor.command_count_for(SessionId(1), TickId(5)), 1);
    }

    #[test]
    fn batch_invalid_outside_its_tick() {
        let pool = BytePool::new();
        let ingestor = CommandIngestor::new();
        ingestor.freeze(TickId(5), vec![frame(&pool, 1, 5)]);
        assert_eq!(ingestor.command_count_for(SessionId(1), TickId(6)), 0);
    }

    #[test]
    fn freeze_replaces_previous_tick_batches() {
        let pool = BytePool::new();
        let ingestor = CommandIngestor::new();
        ingestor.freeze(TickId(5), vec![frame(&pool, 1, 5)]);
        ingestor.freeze(TickId(6), vec![frame(&pool, 2, 6)]);
        assert_eq!(ingestor.session_ids_ascending(), vec![SessionId(2)]);
    }

    #[test]
    fn per_session_cap_only_evicts_the_offending_session() {
        let pool = BytePool::new();
        let mailbox = InboundMailbox::new(2, usize::MAX);
        for _ in 0..3 {
            mailbox.try_enqueue(frame(&pool, 1, 1));
        }
        mailbox.try_enqueue(frame(&pool, 2, 1));

        let mut drained_sessions = Vec::new();
        mailbox.drain(usize::MAX, |f| drained_sessions.push(f.session_id));
        drained_sessions.sort();
        assert_eq!(
            drained_sessions,
            vec![SessionId(1), SessionId(1), SessionId(2)]
        );
        assert_eq!(mailbox.metrics().dropped, 1);
    }

    #[test]
    fn drain_respects_global_max_total_and_session_ordering() {
        let pool = BytePool::new();
        let mailbox = InboundMailbox::new(10, usize::MAX);
        mailbox.try_enqueue(frame(&pool, 2, 1));
        mailbox.try_enqueue(frame(&pool, 1, 1));
        mailbox.try_enqueue(frame(&pool, 1, 1));

        let mut drained = Vec::new();
        mailbox.drain(2, |f| drained.push(f.session_id));
        assert_eq!(drained, vec![SessionId(1), SessionId(1)]);
    }
}
