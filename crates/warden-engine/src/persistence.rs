//! Persistence worker & applier (C7): off-tick writes to an opaque
//! backend, with outcomes applied deterministically on the tick thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use warden_core::error::PersistenceFault;
use warden_core::id::{PlayerId, SaveId, TickId};
use warden_core::persistence::{PersistenceCompletion, PersistenceStatus, PersistenceWriteRequest};
use warden_core::traits::{PhaseHook, TickContext};

use crate::mailbox::{BoundedMailbox, MailboxItem};

impl MailboxItem for PersistenceWriteRequest {
    fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }
}

impl MailboxItem for PersistenceCompletion {
    fn estimated_bytes(&self) -> usize {
        self.payload.len() + 32
    }
}

#[derive(Default)]
struct PlayerQueue {
    requests: VecDeque<PersistenceWriteRequest>,
    bytes: usize,
}

struct WriteMailboxState {
    queues: HashMap<PlayerId, PlayerQueue>,
    total_count: usize,
    total_bytes: usize,
}

/// Point-in-time counters for a [`PersistenceWriteMailbox`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistenceWriteMailboxMetrics {
    /// Total requests ever accepted across every player.
    pub enqueued: u64,
    /// Total requests ever dropped (per-player or global eviction).
    pub dropped: u64,
    /// Requests currently queued.
    pub current_count: usize,
    /// Bytes currently queued.
    pub current_bytes: usize,
}

/// Write requests from any thread to the persistence worker, grouped
/// per player so one player's save volume cannot starve another's, and
/// bounded additionally by a global count/byte cap so the whole fleet
/// still has a ceiling.
pub struct PersistenceWriteMailbox {
    state: Mutex<WriteMailboxState>,
    max_per_player: usize,
    max_bytes_per_player: usize,
    max_global_count: usize,
    max_global_bytes: usize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl PersistenceWriteMailbox {
    /// Create a mailbox whose per-player sub-queues are each bounded by
    /// `max_per_player`/`max_bytes_per_player`, with the whole mailbox
    /// additionally bounded by `max_global_count`/`max_global_bytes`.
    pub fn new(
        max_per_player: usize,
        max_bytes_per_player: usize,
        max_global_count: usize,
        max_global_bytes: usize,
    ) -> Self {
        Self {
            state: Mutex::new(WriteMailboxState {
                queues: HashMap::new(),
                total_count: 0,
                total_bytes: 0,
            }),
            max_per_player,
            max_bytes_per_player,
            max_global_count,
            max_global_bytes,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Pop the oldest request from `player`'s queue, if any, updating
    /// the running totals. Returns whether anything was evicted.
    fn evict_oldest_for(state: &mut WriteMailboxState, player: PlayerId) -> bool {
        if let Some(queue) = state.queues.get_mut(&player) {
            if let Some(evicted) = queue.requests.pop_front() {
                let bytes = evicted.estimated_bytes();
                queue.bytes = queue.bytes.saturating_sub(bytes);
                state.total_bytes = state.total_bytes.saturating_sub(bytes);
                state.total_count -= 1;
                return true;
            }
        }
        false
    }

    /// Enqueue a write request into its player's sub-queue, evicting
    /// that same player's oldest requests while over either per-player
    /// cap, then evicting from whichever player's queue is currently
    /// largest while over either global cap.
    pub fn try_enqueue(&self, request: PersistenceWriteRequest) {
        let item_bytes = request.estimated_bytes();
        let player = request.player_id;
        let mut state = self.state.lock().expect("persistence write mailbox mutex poisoned");

        while state
            .queues
            .get(&player)
            .is_some_and(|q| q.requests.len() >= self.max_per_player || q.bytes + item_bytes > self.max_bytes_per_player)
        {
            if !Self::evict_oldest_for(&mut state, player) {
                break;
            }
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        while state.total_count >= self.max_global_count || state.total_bytes + item_bytes > self.max_global_bytes {
            let biggest = state
                .queues
                .iter()
                .max_by_key(|(_, q)| q.requests.len())
                .map(|(p, _)| *p);
            match biggest {
                Some(p) if Self::evict_oldest_for(&mut state, p) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                _ => break,
            }
        }

        let queue = state.queues.entry(player).or_default();
        queue.requests.push_back(request);
        queue.bytes += item_bytes;
        state.total_count += 1;
        state.total_bytes += item_bytes;
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain every queued request across every player, visiting
    /// players in ascending player id order.
    pub fn drain(&self, mut applier: impl FnMut(PersistenceWriteRequest)) {
        let mut state = self.state.lock().expect("persistence write mailbox mutex poisoned");
        let mut player_ids: Vec<PlayerId> = state.queues.keys().copied().collect();
        player_ids.sort();
        for player in player_ids {
            if let Some(queue) = state.queues.remove(&player) {
                for request in queue.requests {
                    applier(request);
                }
            }
        }
        state.total_count = 0;
        state.total_bytes = 0;
    }

    /// Drop every queued request across every player.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("persistence write mailbox mutex poisoned");
        self.dropped.fetch_add(state.total_count as u64, Ordering::Relaxed);
        state.queues.clear();
        state.total_count = 0;
        state.total_bytes = 0;
    }

    /// Point-in-time counters.
    pub fn metrics(&self) -> PersistenceWriteMailboxMetrics {
        let state = self.state.lock().expect("persistence write mailbox mutex poisoned");
        PersistenceWriteMailboxMetrics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            current_count: state.total_count,
            current_bytes: state.total_bytes,
        }
    }
}

/// Mailbox carrying completions from the persistence worker to the
/// tick thread's applier.
pub type PersistenceCompletionMailbox = BoundedMailbox<PersistenceCompletion>;

/// An opaque persistence backend. Implementations run on the
/// persistence worker's thread, never the tick thread.
pub trait PersistenceWriter: Send + Sync {
    /// Attempt to durably store `payload` for `save_id`. Any error
    /// (including a panic caught at the worker boundary) is mapped to
    /// `PersistenceFault::Unknown` by the worker if this call itself
    /// does not distinguish a reason.
    fn write(&self, save_id: SaveId, payload: &[u8]) -> Result<(), PersistenceFault>;
}

#[derive(Default)]
struct WorkerCounters {
    writes_succeeded: AtomicU64,
    writes_failed: AtomicU64,
}

/// Off-thread worker: drains the write mailbox, calls the writer, and
/// enqueues a completion per request.
pub struct PersistenceWorker {
    writes: std::sync::Arc<PersistenceWriteMailbox>,
    completions: std::sync::Arc<PersistenceCompletionMailbox>,
    writer: std::sync::Arc<dyn PersistenceWriter>,
    max_per_iteration: usize,
    idle_delay: Duration,
    counters: WorkerCounters,
}

impl PersistenceWorker {
    /// Build a worker wired to its mailboxes and backend.
    pub fn new(
        writes: std::sync::Arc<PersistenceWriteMailbox>,
        completions: std::sync::Arc<PersistenceCompletionMailbox>,
        writer: std::sync::Arc<dyn PersistenceWriter>,
        max_per_iteration: usize,
        idle_delay: Duration,
    ) -> Self {
        Self {
            writes,
            completions,
            writer,
            max_per_iteration,
            idle_delay,
            counters: WorkerCounters::default(),
        }
    }

    /// Drain up to `max_per_iteration` write requests, executing each
    /// against the writer and enqueuing a completion.
    pub fn run_iteration(&self) {
        let mut drained = Vec::new();
        let max = self.max_per_iteration;
        self.writes.drain(|req| {
            if drained.len() < max {
                drained.push(req);
            }
        });
        for request in drained {
            let result = self.writer.write(request.save_id, request.payload.bytes());
            let completion = match result {
                Ok(()) => {
                    self.counters.writes_succeeded.fetch_add(1, Ordering::Relaxed);
                    PersistenceCompletion::succeeded(request.save_id, request.player_id, request.payload)
                }
                Err(fault) => {
                    self.counters.writes_failed.fetch_add(1, Ordering::Relaxed);
                    PersistenceCompletion::failed(request.save_id, request.player_id, fault, request.payload)
                }
            };
            let _ = self.completions.try_enqueue(completion);
        }
    }

    /// Run iterations until `stop` is set.
    pub fn run(&self, stop: &AtomicBool, mut sleep: impl FnMut(Duration)) {
        while !stop.load(Ordering::Relaxed) {
            self.run_iteration();
            sleep(self.idle_delay);
        }
    }

    /// Writes succeeded / failed so far.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.counters.writes_succeeded.load(Ordering::Relaxed),
            self.counters.writes_failed.load(Ordering::Relaxed),
        )
    }
}

/// Last known outcome of a save, as recorded by the applier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Owning player.
    pub player_id: PlayerId,
    /// Outcome of the most recent write.
    pub status: PersistenceStatus,
    /// Failure detail, if the most recent write failed.
    pub failure: Option<PersistenceFault>,
    /// Tick the outcome was applied during.
    pub applied_tick: TickId,
}

/// Tick-thread pre-tick hook: drains the completion mailbox and
/// records each outcome in an in-memory last-known-state map keyed by
/// save id, then releases the payload lease.
pub struct PersistenceApplier {
    completions: std::sync::Arc<PersistenceCompletionMailbox>,
    last_known: Mutex<HashMap<SaveId, SaveOutcome>>,
    applied: AtomicU64,
}

impl PersistenceApplier {
    /// Build an applier over a shared completion mailbox.
    pub fn new(completions: std::sync::Arc<PersistenceCompletionMailbox>) -> Self {
        Self {
            completions,
            last_known: Mutex::new(HashMap::new()),
            applied: AtomicU64::new(0),
        }
    }

    /// Drain and apply every queued completion, tagging each with
    /// `tick`.
    pub fn apply(&self, tick: TickId) {
        let mut outcomes = Vec::new();
        self.completions.drain(|completion| outcomes.push(completion));
        let mut last_known = self.last_known.lock().expect("applier mutex poisoned");
        for completion in outcomes {
            last_known.insert(
                completion.save_id,
                SaveOutcome {
                    player_id: completion.player_id,
                    status: completion.status,
                    failure: completion.failure,
                    applied_tick: tick,
                },
            );
            self.applied.fetch_add(1, Ordering::Relaxed);
            drop(completion.payload);
        }
    }

    /// The last known outcome for `save_id`, if any completion has
    /// ever been applied for it.
    pub fn last_known(&self, save_id: SaveId) -> Option<SaveOutcome> {
        self.last_known
            .lock()
            .expect("applier mutex poisoned")
            .get(&save_id)
            .cloned()
    }

    /// Total completions applied so far.
    pub fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Drop every recorded outcome, e.g. during orchestrator teardown.
    pub fn clear(&self) {
        self.last_known.lock().expect("applier mutex poisoned").clear();
    }
}

impl PhaseHook for PersistenceApplier {
    fn name(&self) -> &str {
        "persistence-applier"
    }

    fn on_pre_tick(
        &mut self,
        ctx: &mut dyn TickContext,
        _eligible: &[warden_core::id::EntityHandle],
    ) -> Result<(), warden_core::error::InvariantViolation> {
        self.apply(ctx.tick_index());
        Ok(())
    }

    fn on_post_tick(
        &mut self,
        _ctx: &mut dyn TickContext,
        _eligible: &[warden_core::id::EntityHandle],
    ) -> Result<(), warden_core::error::InvariantViolation> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::pool::BytePool;

    struct AlwaysSucceeds;
    impl PersistenceWriter for AlwaysSucceeds {
        fn write(&self, _save_id: SaveId, _payload: &[u8]) -> Result<(), PersistenceFault> {
            Ok(())
        }
    }

    struct AlwaysFails;
    impl PersistenceWriter for AlwaysFails {
        fn write(&self, _save_id: SaveId, _payload: &[u8]) -> Result<(), PersistenceFault> {
            Err(PersistenceFault::WriterFailed {
                reason: "disk full".into(),
            })
        }
    }

    fn request(pool: &BytePool, save: u128) -> PersistenceWriteRequest {
        PersistenceWriteRequest {
            save_id: SaveId(save),
            player_id: PlayerId(save),
            estimated_bytes: 1,
            label: "test",
            payload: pool.rent(b"x"),
        }
    }

    #[test]
    fn worker_wraps_success_into_completion() {
        let pool = BytePool::new();
        let writes: std::sync::Arc<PersistenceWriteMailbox> =
            std::sync::Arc::new(PersistenceWriteMailbox::new(10, usize::MAX, 10, usize::MAX));
        let completions: std::sync::Arc<PersistenceCompletionMailbox> =
            std::sync::Arc::new(BoundedMailbox::new(10, usize::MAX));
        writes.try_enqueue(request(&pool, 1));
        let worker = PersistenceWorker::new(
            writes,
            completions.clone(),
            std::sync::Arc::new(AlwaysSucceeds),
            10,
            Duration::from_millis(0),
        );
        worker.run_iteration();
        assert_eq!(worker.counters(), (1, 0));
        let mut seen = Vec::new();
        completions.drain(|c| seen.push(c.status));
        assert_eq!(seen, vec![PersistenceStatus::Succeeded]);
    }

    #[test]
    fn worker_wraps_failure_into_completion() {
        let pool = BytePool::new();
        let writes: std::sync::Arc<PersistenceWriteMailbox> =
            std::sync::Arc::new(PersistenceWriteMailbox::new(10, usize::MAX, 10, usize::MAX));
        let completions: std::sync::Arc<PersistenceCompletionMailbox> =
            std::sync::Arc::new(BoundedMailbox::new(10, usize::MAX));
        writes.try_enqueue(request(&pool, 1));
        let worker = PersistenceWorker::new(
            writes,
            completions.clone(),
            std::sync::Arc::new(AlwaysFails),
            10,
            Duration::from_millis(0),
        );
        worker.run_iteration();
        assert_eq!(worker.counters(), (0, 1));
        let mut seen = Vec::new();
        completions.drain(|c| seen.push(c.status));
        assert_eq!(seen, vec![PersistenceStatus::Failed]);
    }

    #[test]
    fn applier_records_last_known_state_and_releases_payload() {
        let pool = BytePool::new();
        let completions: std::sync::Arc<PersistenceCompletionMailbox> =
            std::sync::Arc::new(BoundedMailbox::new(10, usize::MAX));
        completions
            .try_enqueue(PersistenceCompletion::succeeded(
                SaveId(1),
                PlayerId(1),
                pool.rent(b"x"),
            ))
            .unwrap();
        let applier = PersistenceApplier::new(completions);
        applier.apply(TickId(9));
        let outcome = applier.last_known(SaveId(1)).unwrap();
        assert_eq!(outcome.status, PersistenceStatus::Succeeded);
        assert_eq!(outcome.applied_tick, TickId(9));
        assert_eq!(applier.applied_count(), 1);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn per_player_cap_only_evicts_the_offending_player() {
        let pool = BytePool::new();
        let writes = PersistenceWriteMailbox::new(2, usize::MAX, usize::MAX, usize::MAX);
        for _ in 0..3 {
            writes.try_enqueue(request(&pool, 1));
        }
        writes.try_enqueue(request(&pool, 2));

        let mut seen = Vec::new();
        writes.drain(|r| seen.push(r.player_id));
        seen.sort();
        assert_eq!(seen, vec![PlayerId(1), PlayerId(1), PlayerId(2)]);
        assert_eq!(writes.metrics().dropped, 1);
    }

    #[test]
    fn global_cap_evicts_from_the_largest_player_queue() {
        let pool = BytePool::new();
        let writes = PersistenceWriteMailbox::new(usize::MAX, usize::MAX, 3, usize::MAX);
        writes.try_enqueue(request(&pool, 1));
        writes.try_enqueue(request(&pool, 1));
        writes.try_enqueue(request(&pool, 2));
        // global cap is 3; this fourth request must evict from player 1's
        // queue (size 2) rather than player 2's (size 1).
        writes.try_enqueue(request(&pool, 2));

        let mut seen = Vec::new();
        writes.drain(|r| seen.push(r.player_id));
        seen.sort();
        assert_eq!(seen, vec![PlayerId(1), PlayerId(2), PlayerId(2)]);
    }

    #[test]
    fn drain_visits_players_in_ascending_order_and_resets_totals() {
        let pool = BytePool::new();
        let writes = PersistenceWriteMailbox::new(usize::MAX, usize::MAX, usize::MAX, usize::MAX);
        writes.try_enqueue(request(&pool, 2));
        writes.try_enqueue(request(&pool, 1));

        let mut seen = Vec::new();
        writes.drain(|r| seen.push(r.player_id));
        assert_eq!(seen, vec![PlayerId(1), PlayerId(2)]);
        assert_eq!(writes.metrics().current_count, 0);
        assert_eq!(writes.metrics().current_bytes, 0);
    }
}
