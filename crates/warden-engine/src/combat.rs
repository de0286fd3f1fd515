//! Combat event buffer & replication guard (C8): a fixed-capacity
//! per-tick emission buffer and a per-client exactly-once delivery set.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use warden_core::combat::{CombatEvent, CombatEventBatch};
use warden_core::error::InvariantViolation;
use warden_core::id::{AuthoritativeTick, EntityHandle, EventId, SessionId, TickId};
use warden_core::traits::{PhaseHook, TickContext};

use crate::thread_guard::assert_tick_thread;

/// Outcome of [`CombatEventBuffer::try_emit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The event was accepted.
    Accepted,
    /// Rejected: the buffer already holds events for a different
    /// tick. Counted, not fatal.
    TickMismatch,
    /// Rejected: the buffer is at capacity. Counted, not fatal.
    Overflow,
}

struct Inner {
    tick: Option<AuthoritativeTick>,
    events: Vec<CombatEvent>,
}

/// Fixed-capacity buffer of combat events emitted during a single
/// tick. Adopts the tick of its first event; a mismatched tick or a
/// full buffer rejects without panicking.
pub struct CombatEventBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
    tick_mismatches: AtomicU64,
    overflows: AtomicU64,
}

impl CombatEventBuffer {
    /// Create a buffer bounded by `capacity` events per tick.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                tick: None,
                events: Vec::with_capacity(capacity),
            }),
            tick_mismatches: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
        }
    }

    /// Build a combat event from the current tick and emit it,
    /// performing the checked `TickId` → `AuthoritativeTick` narrowing
    /// before the event is constructed. This is the only sanctioned way
    /// to turn a live tick index into an event's authoritative tick —
    /// no caller should build `AuthoritativeTick` by hand.
    pub fn try_emit_at_tick(
        &self,
        tick: TickId,
        event_id: EventId,
        context_id: i64,
        event_type: u32,
        subject: EntityHandle,
        outcome: Option<Vec<u8>>,
    ) -> Result<EmitOutcome, InvariantViolation> {
        let authoritative_tick = AuthoritativeTick::try_from_tick(tick)?;
        self.try_emit(CombatEvent {
            event_id,
            authoritative_tick,
            context_id,
            event_type,
            subject,
            outcome,
        })
    }

    /// Attempt to emit one event. Asserts tick-thread-exclusivity in
    /// debug builds.
    pub fn try_emit(&self, event: CombatEvent) -> Result<EmitOutcome, InvariantViolation> {
        assert_tick_thread()?;
        let mut inner = self.inner.lock().expect("combat buffer mutex poisoned");
        match inner.tick {
            None => inner.tick = Some(event.authoritative_tick),
            Some(existing) if existing != event.authoritative_tick => {
                self.tick_mismatches.fetch_add(1, Ordering::Relaxed);
                return Ok(EmitOutcome::TickMismatch);
            }
            _ => {}
        }
        if inner.events.len() >= self.capacity {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            return Ok(EmitOutcome::Overflow);
        }
        inner.events.push(event);
        Ok(EmitOutcome::Accepted)
    }

    /// Drain the buffer into an immutable batch tagged with `tick`,
    /// fully resetting the buffer (clearing slots so array references
    /// do not pin payloads).
    pub fn drain(&self, tick: AuthoritativeTick) -> CombatEventBatch {
        let mut inner = self.inner.lock().expect("combat buffer mutex poisoned");
        let events = std::mem::take(&mut inner.events);
        inner.tick = None;
        CombatEventBatch { tick, events }
    }

    /// Events rejected for carrying a different tick than the buffer
    /// had already adopted.
    pub fn tick_mismatches(&self) -> u64 {
        self.tick_mismatches.load(Ordering::Relaxed)
    }

    /// Events rejected for exceeding capacity.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

/// Per-client delivered-event-id tracking, reused across ticks and
/// cleared lazily on first use of a new tick to avoid reallocating the
/// underlying set.
struct ClientGuard {
    tick: Option<AuthoritativeTick>,
    delivered: HashSet<EventId>,
}

/// Resolves, per emitted event, which clients should receive it and
/// enforces per-client exactly-once delivery for the current tick.
pub struct DeliveryGuard {
    max_count: usize,
    guards: Mutex<HashMap<SessionId, ClientGuard>>,
    hits: AtomicU64,
    misses: AtomicU64,
    overflows: AtomicU64,
    releases: AtomicU64,
    mismatched_releases: AtomicU64,
}

/// Outcome of [`DeliveryGuard::check_and_record`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Event already delivered to this client this tick; skip sending.
    Hit,
    /// Event not yet delivered; caller should send and it is now
    /// recorded.
    Miss,
}

impl DeliveryGuard {
    /// Build a guard bounded by `max_count` delivered ids tracked per
    /// client before it clears itself.
    pub fn new(max_count: usize) -> Self {
        Self {
            max_count,
            guards: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            mismatched_releases: AtomicU64::new(0),
        }
    }

    /// Consult and update the guard for `client` and `event_id` at
    /// `tick`. The guard clears itself lazily if `tick` differs from
    /// what it last saw.
    pub fn check_and_record(
        &self,
        client: SessionId,
        tick: AuthoritativeTick,
        event_id: EventId,
    ) -> GuardDecision {
        let mut guards = self.guards.lock().expect("delivery guard mutex poisoned");
        let guard = guards.entry(client).or_insert_with(|| ClientGuard {
            tick: None,
            delivered: HashSet::new(),
        });
        if guard.tick != Some(tick) {
            guard.delivered.clear();
            guard.tick = Some(tick);
        }
        if guard.delivered.contains(&event_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return GuardDecision::Hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        if guard.delivered.len() >= self.max_count {
            guard.delivered.clear();
            self.overflows.fetch_add(1, Ordering::Relaxed);
        }
        guard.delivered.insert(event_id);
        GuardDecision::Miss
    }

    /// Clear and remove a client's guard, e.g. on disconnect.
    /// Releasing a client with no guard is counted but non-fatal.
    pub fn release_client(&self, client: SessionId) {
        let mut guards = self.guards.lock().expect("delivery guard mutex poisoned");
        if guards.remove(&client).is_some() {
            self.releases.fetch_add(1, Ordering::Relaxed);
        } else {
            self.mismatched_releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Delivery hits, misses, overflow clears, and release counters.
    pub fn counters(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.overflows.load(Ordering::Relaxed),
            self.releases.load(Ordering::Relaxed),
            self.mismatched_releases.load(Ordering::Relaxed),
        )
    }
}

/// Sends a combat event payload to a single client. Implementations
/// run on the tick thread, during replication.
pub trait CombatSender: Send + Sync {
    /// Deliver `event` to `client`. Delivery failure is recorded by
    /// the caller, never propagated as a tick failure.
    fn send(&self, client: SessionId, event: &CombatEvent) -> bool;
}

/// Observes each event actually replicated to a client, e.g. for
/// offline verification or audit logging.
pub trait ValidationSink: Send + Sync {
    /// Record that `event_id` was delivered to `client`.
    fn record(&self, client: SessionId, event_id: EventId);
}

/// Resolves which clients should receive a given combat event.
/// Implementations run on the tick thread, during replication.
pub trait CombatSubscribers: Send + Sync {
    /// Clients subscribed to `event`.
    fn subscribers_for(&self, event: &CombatEvent) -> Vec<SessionId>;
}

/// For each event in a batch, in emission order, resolve `subscribers`
/// and replicate to every client the guard has not already delivered
/// that event to this tick.
pub fn replicate(
    batch: &CombatEventBatch,
    subscribers: impl Fn(&CombatEvent) -> Vec<SessionId>,
    guard: &DeliveryGuard,
    sender: &dyn CombatSender,
    sink: &dyn ValidationSink,
) {
    for event in &batch.events {
        for client in subscribers(event) {
            if guard.check_and_record(client, batch.tick, event.event_id) == GuardDecision::Hit {
                continue;
            }
            if sender.send(client, event) {
                sink.record(client, event.event_id);
            }
        }
    }
}

/// Post-tick hook that drains the combat buffer for the tick that just
/// committed and replicates it to subscribers through the delivery
/// guard. Registered by the orchestrator after the event-producing
/// participants so a tick's own combat output reaches clients the same
/// tick it was emitted in.
pub struct CombatReplicationHook {
    buffer: std::sync::Arc<CombatEventBuffer>,
    guard: std::sync::Arc<DeliveryGuard>,
    sender: std::sync::Arc<dyn CombatSender>,
    sink: std::sync::Arc<dyn ValidationSink>,
    subscribers: std::sync::Arc<dyn CombatSubscribers>,
}

impl CombatReplicationHook {
    /// Build a hook wired to the buffer it drains and the delivery
    /// dependencies replication needs.
    pub fn new(
        buffer: std::sync::Arc<CombatEventBuffer>,
        guard: std::sync::Arc<DeliveryGuard>,
        sender: std::sync::Arc<dyn CombatSender>,
        sink: std::sync::Arc<dyn ValidationSink>,
        subscribers: std::sync::Arc<dyn CombatSubscribers>,
    ) -> Self {
        Self {
            buffer,
            guard,
            sender,
            sink,
            subscribers,
        }
    }
}

impl PhaseHook for CombatReplicationHook {
    fn name(&self) -> &str {
        "combat-replication"
    }

    fn on_pre_tick(&mut self, _ctx: &mut dyn TickContext, _eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
        Ok(())
    }

    fn on_post_tick(&mut self, ctx: &mut dyn TickContext, _eligible: &[EntityHandle]) -> Result<(), InvariantViolation> {
        let authoritative_tick = AuthoritativeTick::try_from_tick(ctx.tick_index())?;
        let batch = self.buffer.drain(authoritative_tick);
        if batch.events.is_empty() {
            return Ok(());
        }
        replicate(
            &batch,
            |event| self.subscribers.subscribers_for(event),
            &self.guard,
            self.sender.as_ref(),
            self.sink.as_ref(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTickCtx(TickId);
    impl TickContext for FixedTickCtx {
        fn tick_index(&self) -> TickId {
            self.0
        }
        fn fixed_delta(&self) -> std::time::Duration {
            std::time::Duration::from_millis(100)
        }
        fn buffer_effect(
            &mut self,
            _effect: warden_core::effect::EffectCommand,
        ) -> Result<(), InvariantViolation> {
            Ok(())
        }
    }

    struct AllSubscribers(Vec<SessionId>);
    impl CombatSubscribers for AllSubscribers {
        fn subscribers_for(&self, _event: &CombatEvent) -> Vec<SessionId> {
            self.0.clone()
        }
    }

    struct RecordingSender(Mutex<Vec<(SessionId, EventId)>>);
    impl CombatSender for RecordingSender {
        fn send(&self, client: SessionId, event: &CombatEvent) -> bool {
            self.0.lock().unwrap().push((client, event.event_id));
            true
        }
    }

    struct NullSink;
    impl ValidationSink for NullSink {
        fn record(&self, _client: SessionId, _event_id: EventId) {}
    }

    #[test]
    fn replication_hook_drains_and_replicates_on_post_tick() {
        let buffer = std::sync::Arc::new(CombatEventBuffer::new(4));
        buffer
            .try_emit_at_tick(TickId(7), EventId(1), 1, 1, EntityHandle(1), None)
            .unwrap();
        let sender = std::sync::Arc::new(RecordingSender(Mutex::new(Vec::new())));
        let mut hook = CombatReplicationHook::new(
            buffer,
            std::sync::Arc::new(DeliveryGuard::new(16)),
            sender.clone(),
            std::sync::Arc::new(NullSink),
            std::sync::Arc::new(AllSubscribers(vec![SessionId(9)])),
        );
        let mut ctx = FixedTickCtx(TickId(7));
        hook.on_post_tick(&mut ctx, &[]).unwrap();
        assert_eq!(sender.0.lock().unwrap().clone(), vec![(SessionId(9), EventId(1))]);
    }

    fn event(id: u64, tick: i32) -> CombatEvent {
        CombatEvent {
            event_id: EventId(id),
            authoritative_tick: AuthoritativeTick(tick),
            context_id: 1,
            event_type: 1,
            subject: EntityHandle(1),
            outcome: None,
        }
    }

    #[test]
    fn try_emit_at_tick_narrows_and_rejects_overflow() {
        let buf = CombatEventBuffer::new(4);
        assert_eq!(
            buf.try_emit_at_tick(TickId(5), EventId(1), 1, 1, EntityHandle(1), None)
                .unwrap(),
            EmitOutcome::Accepted
        );
        let err = buf
            .try_emit_at_tick(TickId(i64::MAX), EventId(2), 1, 1, EntityHandle(1), None)
            .unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::TickIndexOverflow {
                tick: TickId(i64::MAX)
            }
        );
    }

    #[test]
    fn buffer_adopts_first_tick_and_rejects_mismatch() {
        let buf = CombatEventBuffer::new(4);
        assert_eq!(buf.try_emit(event(1, 5)).unwrap(), EmitOutcome::Accepted);
        assert_eq!(buf.try_emit(event(2, 6)).unwrap(), EmitOutcome::TickMismatch);
        assert_eq!(buf.tick_mismatches(), 1);
    }

    #[test]
    fn buffer_rejects_overflow_and_drain_resets() {
        let buf = CombatEventBuffer::new(1);
        assert_eq!(buf.try_emit(event(1, 5)).unwrap(), EmitOutcome::Accepted);
        assert_eq!(buf.try_emit(event(2, 5)).unwrap(), EmitOutcome::Overflow);
        let batch = buf.drain(AuthoritativeTick(5));
        assert_eq!(batch.events.len(), 1);
        assert_eq!(buf.try_emit(event(3, 6)).unwrap(), EmitOutcome::Accepted);
    }

    #[test]
    fn delivery_guard_skips_repeat_delivery_same_tick() {
        let guard = DeliveryGuard::new(10);
        let client = SessionId(1);
        let tick = AuthoritativeTick(1);
        assert_eq!(
            guard.check_and_record(client, tick, EventId(1)),
            GuardDecision::Miss
        );
        assert_eq!(
            guard.check_and_record(client, tick, EventId(1)),
            GuardDecision::Hit
        );
        let (hits, misses, _, _, _) = guard.counters();
        assert_eq!((hits, misses), (1, 1));
    }

    #[test]
    fn delivery_guard_clears_lazily_on_new_tick() {
        let guard = DeliveryGuard::new(10);
        let client = SessionId(1);
        guard.check_and_record(client, AuthoritativeTick(1), EventId(1));
        assert_eq!(
            guard.check_and_record(client, AuthoritativeTick(2), EventId(1)),
            GuardDecision::Miss
        );
    }

    #[test]
    fn delivery_guard_overflow_clears_and_counts() {
        let guard = DeliveryGuard::new(1);
        let client = SessionId(1);
        let tick = AuthoritativeTick(1);
        guard.check_and_record(client, tick, EventId(1));
        guard.check_and_record(client, tick, EventId(2));
        let (_, _, overflows, _, _) = guard.counters();
        assert_eq!(overflows, 1);
    }

    #[test]
    fn release_client_counts_mismatch_when_absent() {
        let guard = DeliveryGuard::new(10);
        guard.release_client(SessionId(1));
        let (_, _, _, releases, mismatched) = guard.counters();
        assert_eq!((releases, mismatched), (0, 1));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn at_most_one_miss_per_event_within_a_tick_unless_overflowed(
            max_count in 2usize..20,
            event_ids in prop::collection::vec(0u64..10, 1..40),
        ) {
            let guard = DeliveryGuard::new(max_count);
            let client = SessionId(1);
            let tick = AuthoritativeTick(1);
            let mut seen = std::collections::HashSet::new();
            for id in event_ids {
                let decision = guard.check_and_record(client, tick, EventId(id));
                if decision == GuardDecision::Miss && seen.contains(&id) {
                    let (_, _, overflows, _, _) = guard.counters();
                    prop_assert!(overflows > 0);
                }
                seen.insert(id);
            }
        }
    }
}
